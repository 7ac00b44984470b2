//! The balance ledger service: the boundary the UI layer talks to.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, instrument, warn};

use stockledger_core::{AddressName, ArticleId, DomainError};
use stockledger_inventory::{
    Article, EnsureArticle, Movement, MovementRequest, ReorderLine, UpdateArticle,
    compute_reorder_set, search_articles, warranty_table,
};

use crate::cache::{CachedView, ReadCache, ViewKey};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::migrations::run_migrations;
use crate::settings::{self, REORDER_THRESHOLD_KEY};
use crate::store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};

/// Balance ledger over a [`LedgerStore`].
///
/// Mutations go straight to the store and clear the read cache once they
/// commit. Listing operations are served through the cache and may lag behind
/// by at most the configured TTL.
pub struct Ledger<S> {
    store: S,
    cache: ReadCache,
    config: LedgerConfig,
}

impl Ledger<InMemoryLedgerStore> {
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(InMemoryLedgerStore::new(), config)
    }
}

impl Ledger<PostgresLedgerStore> {
    /// Connect to `config.database_url`, migrate the schema and build the ledger.
    pub async fn connect(config: LedgerConfig) -> LedgerResult<Self> {
        let url = config.database_url.clone().ok_or_else(|| {
            LedgerError::Configuration("no database URL configured".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .map_err(|e| LedgerError::storage(format!("cannot connect to database: {e}")))?;

        let applied = run_migrations(&pool).await?;
        info!(applied = applied.len(), "ledger schema ready");

        Ok(Self::new(PostgresLedgerStore::new(pool), config))
    }
}

impl<S> Ledger<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            cache: ReadCache::new(config.cache_ttl()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // --- articles ---------------------------------------------------------

    /// Register the article or refresh its name/threshold. Counters are never reset.
    ///
    /// A blank `display_name` keeps the current one; `reorder_threshold: None`
    /// makes the article follow the global threshold.
    #[instrument(skip(self, display_name), fields(article_id = %id), err)]
    pub async fn ensure_article(
        &self,
        id: ArticleId,
        display_name: impl Into<String>,
        reorder_threshold: Option<i64>,
    ) -> LedgerResult<Article> {
        let article = self
            .store
            .ensure_article(EnsureArticle {
                article_id: id,
                display_name: display_name.into(),
                reorder_threshold,
            })
            .await?;
        self.cache.invalidate_all();
        Ok(article)
    }

    #[instrument(skip(self, display_name), fields(article_id = %id), err)]
    pub async fn update_article(
        &self,
        id: ArticleId,
        display_name: impl Into<String>,
        reorder_threshold: Option<i64>,
    ) -> LedgerResult<Article> {
        let article = self
            .store
            .update_article(UpdateArticle {
                article_id: id,
                display_name: display_name.into(),
                reorder_threshold,
            })
            .await?;
        self.cache.invalidate_all();
        Ok(article)
    }

    #[instrument(skip(self), fields(from = %from, to = %to), err)]
    pub async fn rename_article(&self, from: &ArticleId, to: &ArticleId) -> LedgerResult<Article> {
        let article = self.store.rename_article(from, to).await?;
        self.cache.invalidate_all();
        info!(%from, %to, "article renamed");
        Ok(article)
    }

    /// Remove an article and its whole movement history. Irreversible.
    #[instrument(skip(self), fields(article_id = %id), err)]
    pub async fn delete_article(&self, id: &ArticleId) -> LedgerResult<()> {
        self.store.delete_article(id).await?;
        self.cache.invalidate_all();
        warn!(article_id = %id, "article and its movements deleted");
        Ok(())
    }

    /// Live state of one article (never cached).
    pub async fn get_article(&self, id: &ArticleId) -> LedgerResult<Option<Article>> {
        self.store.get_article(id).await
    }

    // --- movements --------------------------------------------------------

    /// Validate and apply one movement atomically, returning the audit record.
    pub async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<Movement> {
        let article_id = request.article_id.clone();
        let direction = request.direction;
        let location = request.location;
        let quantity = request.quantity;

        match self.store.apply_movement(request).await {
            Ok(movement) => {
                self.cache.invalidate_all();
                info!(
                    article_id = %article_id,
                    movement_id = movement.id,
                    %direction,
                    %location,
                    quantity = quantity.get(),
                    "movement recorded"
                );
                Ok(movement)
            }
            Err(err) => {
                warn!(
                    article_id = %article_id,
                    %direction,
                    %location,
                    quantity = quantity.get(),
                    recoverable = err.is_recoverable(),
                    "movement rejected: {err}"
                );
                Err(err)
            }
        }
    }

    /// Most recent movements first.
    pub async fn list_movements(&self, limit: usize) -> LedgerResult<Arc<Vec<Movement>>> {
        self.cached_movements(None, limit).await
    }

    /// The history view, sized by `history_limit`.
    pub async fn recent_movements(&self) -> LedgerResult<Arc<Vec<Movement>>> {
        self.cached_movements(None, self.config.history_limit).await
    }

    pub async fn article_movements(
        &self,
        id: &ArticleId,
        limit: usize,
    ) -> LedgerResult<Arc<Vec<Movement>>> {
        self.cached_movements(Some(id.clone()), limit).await
    }

    // --- read views -------------------------------------------------------

    /// Current snapshot of every article, ordered by identifier.
    pub async fn list_articles(&self) -> LedgerResult<Arc<Vec<Article>>> {
        let key = ViewKey::Articles;
        if let Some(CachedView::Articles(articles)) = self.cache.get(&key) {
            debug!("articles served from cache");
            return Ok(articles);
        }

        let generation = self.cache.generation();
        let articles = Arc::new(self.store.list_articles().await?);
        self.cache
            .put(key, CachedView::Articles(articles.clone()), generation);
        Ok(articles)
    }

    pub async fn search_articles(&self, query: &str) -> LedgerResult<Vec<Article>> {
        let articles = self.list_articles().await?;
        Ok(search_articles(articles.iter(), query))
    }

    /// Articles at or below their effective threshold, against an explicit global one.
    pub async fn compute_reorder_set(
        &self,
        global_threshold: i64,
    ) -> LedgerResult<Vec<ReorderLine>> {
        if global_threshold < 0 {
            return Err(DomainError::validation(format!(
                "reorder threshold cannot be negative (got {global_threshold})"
            ))
            .into());
        }
        let articles = self.list_articles().await?;
        Ok(compute_reorder_set(articles.iter(), global_threshold))
    }

    /// Reorder set against the stored global threshold.
    pub async fn reorder_set(&self) -> LedgerResult<Vec<ReorderLine>> {
        let threshold = self.reorder_threshold().await?;
        self.compute_reorder_set(threshold).await
    }

    pub async fn warranty_table(&self) -> LedgerResult<Vec<Article>> {
        let articles = self.list_articles().await?;
        Ok(warranty_table(articles.iter()))
    }

    // --- addresses --------------------------------------------------------

    #[instrument(skip(self), fields(address = %name), err)]
    pub async fn add_address(&self, name: &AddressName) -> LedgerResult<()> {
        self.store.add_address(name).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub async fn list_addresses(&self) -> LedgerResult<Arc<Vec<AddressName>>> {
        let key = ViewKey::Addresses;
        if let Some(CachedView::Addresses(names)) = self.cache.get(&key) {
            return Ok(names);
        }

        let generation = self.cache.generation();
        let names = Arc::new(self.store.list_addresses().await?);
        self.cache
            .put(key, CachedView::Addresses(names.clone()), generation);
        Ok(names)
    }

    #[instrument(skip(self), fields(address = %name), err)]
    pub async fn delete_address(&self, name: &AddressName) -> LedgerResult<()> {
        self.store.delete_address(name).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    // --- settings ---------------------------------------------------------

    /// Global reorder threshold, seeded with the configured default on first access.
    pub async fn reorder_threshold(&self) -> LedgerResult<i64> {
        settings::get_or_init(
            &self.store,
            REORDER_THRESHOLD_KEY,
            self.config.default_reorder_threshold,
        )
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn set_reorder_threshold(&self, threshold: i64) -> LedgerResult<()> {
        if threshold < 0 {
            return Err(DomainError::validation(format!(
                "reorder threshold cannot be negative (got {threshold})"
            ))
            .into());
        }
        settings::set(&self.store, REORDER_THRESHOLD_KEY, &threshold).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    async fn cached_movements(
        &self,
        article: Option<ArticleId>,
        limit: usize,
    ) -> LedgerResult<Arc<Vec<Movement>>> {
        let key = ViewKey::Movements {
            article: article.clone(),
            limit,
        };
        if let Some(CachedView::Movements(movements)) = self.cache.get(&key) {
            debug!(limit, "movements served from cache");
            return Ok(movements);
        }

        let generation = self.cache.generation();
        let movements = Arc::new(self.store.list_movements(article.as_ref(), limit).await?);
        self.cache
            .put(key, CachedView::Movements(movements.clone()), generation);
        Ok(movements)
    }
}
