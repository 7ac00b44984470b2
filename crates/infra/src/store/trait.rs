use std::sync::Arc;

use async_trait::async_trait;

use stockledger_core::{AddressName, ArticleId};
use stockledger_inventory::{
    Article, ArticleEvent, EnsureArticle, Movement, MovementRequest, NewMovement, UpdateArticle,
};

use crate::error::LedgerResult;

/// Persistence boundary of the balance ledger.
///
/// ## Mutation semantics
///
/// Every mutating method is one all-or-nothing unit. In particular
/// `apply_movement` must:
/// - read the article's current counters under per-article mutual exclusion
/// - let the [`Article`] aggregate decide (validation happens there)
/// - persist the new counters and append exactly one movement record
///
/// A rejected request leaves no trace: no counter change, no movement row.
///
/// ## Read semantics
///
/// Reads return the live committed state. Caching is layered on top by
/// [`crate::Ledger`] and is never consulted here.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Idempotent upsert: registers on first reference, refreshes name and
    /// threshold afterwards, never touches counters.
    async fn ensure_article(&self, cmd: EnsureArticle) -> LedgerResult<Article>;

    /// Edit name/threshold of an existing article.
    async fn update_article(&self, cmd: UpdateArticle) -> LedgerResult<Article>;

    /// Move an article (counters and history) to a new identifier.
    async fn rename_article(&self, from: &ArticleId, to: &ArticleId) -> LedgerResult<Article>;

    async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<Movement>;

    async fn get_article(&self, id: &ArticleId) -> LedgerResult<Option<Article>>;

    /// All articles, ordered by identifier.
    async fn list_articles(&self) -> LedgerResult<Vec<Article>>;

    /// Most recent movements first, optionally restricted to one article.
    async fn list_movements(
        &self,
        article: Option<&ArticleId>,
        limit: usize,
    ) -> LedgerResult<Vec<Movement>>;

    /// Remove an article and its whole movement history.
    async fn delete_article(&self, id: &ArticleId) -> LedgerResult<()>;

    async fn add_address(&self, name: &AddressName) -> LedgerResult<()>;

    /// Address names in lexical order.
    async fn list_addresses(&self) -> LedgerResult<Vec<AddressName>>;

    /// Fails with `Conflict` while any movement still references the address.
    async fn delete_address(&self, name: &AddressName) -> LedgerResult<()>;

    async fn get_setting(&self, key: &str) -> LedgerResult<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> LedgerResult<()>;

    /// Store `value` unless the key already has one; returns the stored value.
    async fn init_setting(&self, key: &str, value: &str) -> LedgerResult<String>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn ensure_article(&self, cmd: EnsureArticle) -> LedgerResult<Article> {
        (**self).ensure_article(cmd).await
    }

    async fn update_article(&self, cmd: UpdateArticle) -> LedgerResult<Article> {
        (**self).update_article(cmd).await
    }

    async fn rename_article(&self, from: &ArticleId, to: &ArticleId) -> LedgerResult<Article> {
        (**self).rename_article(from, to).await
    }

    async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<Movement> {
        (**self).apply_movement(request).await
    }

    async fn get_article(&self, id: &ArticleId) -> LedgerResult<Option<Article>> {
        (**self).get_article(id).await
    }

    async fn list_articles(&self) -> LedgerResult<Vec<Article>> {
        (**self).list_articles().await
    }

    async fn list_movements(
        &self,
        article: Option<&ArticleId>,
        limit: usize,
    ) -> LedgerResult<Vec<Movement>> {
        (**self).list_movements(article, limit).await
    }

    async fn delete_article(&self, id: &ArticleId) -> LedgerResult<()> {
        (**self).delete_article(id).await
    }

    async fn add_address(&self, name: &AddressName) -> LedgerResult<()> {
        (**self).add_address(name).await
    }

    async fn list_addresses(&self) -> LedgerResult<Vec<AddressName>> {
        (**self).list_addresses().await
    }

    async fn delete_address(&self, name: &AddressName) -> LedgerResult<()> {
        (**self).delete_address(name).await
    }

    async fn get_setting(&self, key: &str) -> LedgerResult<Option<String>> {
        (**self).get_setting(key).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> LedgerResult<()> {
        (**self).set_setting(key, value).await
    }

    async fn init_setting(&self, key: &str, value: &str) -> LedgerResult<String> {
        (**self).init_setting(key, value).await
    }
}

/// The movement carried by a decision, if any.
pub(crate) fn recorded_movement(events: &[ArticleEvent]) -> Option<&NewMovement> {
    events.iter().find_map(|e| match e {
        ArticleEvent::MovementRecorded(m) => Some(&m.movement),
        _ => None,
    })
}
