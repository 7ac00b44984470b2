//! Postgres-backed ledger store.
//!
//! Per-article mutual exclusion comes from row locks: every mutation starts a
//! transaction and takes `SELECT ... FOR UPDATE` on the article row before the
//! aggregate decides. Concurrent movements against the same article therefore
//! queue behind each other and always validate against committed counters.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError |
//! |------------|-----------------------|-------------|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (other) | any other | `Storage` |
//! | PoolClosed / Io / Tls / other | N/A | `Storage` |

use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use stockledger_core::{AddressName, Aggregate, ArticleId, DomainError, Event, Quantity};
use stockledger_inventory::{
    Article, ArticleCommand, ArticleEvent, Balance, Direction, EnsureArticle, Location, Movement,
    MovementRequest, UpdateArticle,
};

use super::r#trait::{LedgerStore, recorded_movement};
use crate::error::{LedgerError, LedgerResult};

/// Postgres-backed ledger store.
///
/// Cheap to clone; the pool is shared.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Wrap a pool whose schema is already migrated (see [`crate::migrations`]).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    /// Run an article command under the article's row lock and persist its events.
    async fn decide(&self, id: &ArticleId, command: ArticleCommand) -> LedgerResult<Article> {
        let mut tx = self.begin().await?;

        let mut article = lock_article(&mut tx, id)
            .await?
            .unwrap_or_else(|| Article::empty(id.clone()));

        let events = match article.handle(&command) {
            Ok(events) => events,
            Err(e) => {
                rollback(tx).await?;
                return Err(e.into());
            }
        };

        for event in &events {
            debug!(article_id = %id, event = event.event_type(), "persisting event");
            match event {
                ArticleEvent::ArticleRegistered(e) => {
                    // A concurrent registration may have won the insert; fall
                    // back to refreshing name/threshold like any later reference.
                    let row = sqlx::query_as::<_, ArticleRow>(
                        r#"
                        INSERT INTO articles (id, display_name, stock, warranty, reorder_threshold)
                        VALUES ($1, $2, 0, 0, $3)
                        ON CONFLICT (id) DO UPDATE SET
                            display_name = CASE
                                WHEN EXCLUDED.display_name <> '' THEN EXCLUDED.display_name
                                ELSE articles.display_name
                            END,
                            reorder_threshold = EXCLUDED.reorder_threshold
                        RETURNING id, display_name, stock, warranty, reorder_threshold
                        "#,
                    )
                    .bind(e.article_id.as_str())
                    .bind(&e.display_name)
                    .bind(e.reorder_threshold)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("register_article", e))?;
                    article = row.into_article()?;
                }
                ArticleEvent::ArticleUpdated(e) => {
                    sqlx::query(
                        r#"
                        UPDATE articles
                        SET display_name = $2, reorder_threshold = $3
                        WHERE id = $1
                        "#,
                    )
                    .bind(e.article_id.as_str())
                    .bind(&e.display_name)
                    .bind(e.reorder_threshold)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_article", e))?;
                    article.apply(event);
                }
                ArticleEvent::MovementRecorded(_) => {
                    return Err(LedgerError::storage(
                        "movement decisions must go through apply_movement",
                    ));
                }
            }
        }

        commit(tx).await?;
        Ok(article)
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip_all, fields(article_id = %cmd.article_id), err)]
    async fn ensure_article(&self, cmd: EnsureArticle) -> LedgerResult<Article> {
        let id = cmd.article_id.clone();
        self.decide(&id, ArticleCommand::Ensure(cmd)).await
    }

    #[instrument(skip_all, fields(article_id = %cmd.article_id), err)]
    async fn update_article(&self, cmd: UpdateArticle) -> LedgerResult<Article> {
        let id = cmd.article_id.clone();
        self.decide(&id, ArticleCommand::Update(cmd)).await
    }

    #[instrument(skip_all, fields(from = %from, to = %to), err)]
    async fn rename_article(&self, from: &ArticleId, to: &ArticleId) -> LedgerResult<Article> {
        let mut tx = self.begin().await?;

        let Some(article) = lock_article(&mut tx, from).await? else {
            rollback(tx).await?;
            return Err(DomainError::not_found(format!("article {from}")).into());
        };
        if from == to {
            rollback(tx).await?;
            return Ok(article);
        }

        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM articles WHERE id = $1)")
            .bind(to.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("check_rename_target", e))?;
        if taken {
            rollback(tx).await?;
            return Err(DomainError::conflict(format!("article {to} already exists")).into());
        }

        // movements.article_id follows through ON UPDATE CASCADE.
        sqlx::query("UPDATE articles SET id = $2 WHERE id = $1")
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("rename_article", e))?;

        commit(tx).await?;
        Ok(article.renamed(to.clone()))
    }

    #[instrument(
        skip_all,
        fields(
            article_id = %request.article_id,
            direction = %request.direction,
            location = %request.location,
            quantity = request.quantity.get()
        ),
        err
    )]
    async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<Movement> {
        let mut tx = self.begin().await?;

        let mut article = lock_article(&mut tx, &request.article_id)
            .await?
            .unwrap_or_else(|| Article::empty(request.article_id.clone()));

        let events = match article.handle(&ArticleCommand::RecordMovement(request.clone())) {
            Ok(events) => events,
            Err(e) => {
                rollback(tx).await?;
                return Err(e.into());
            }
        };

        if let Some(address) = &request.address {
            // FOR SHARE keeps the address alive until this movement commits.
            let found: Option<i64> =
                sqlx::query_scalar("SELECT id FROM addresses WHERE name = $1 FOR SHARE")
                    .bind(address.as_str())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("lock_address", e))?;
            if found.is_none() {
                rollback(tx).await?;
                return Err(DomainError::not_found(format!("address {address}")).into());
            }
        }

        let new_movement = recorded_movement(&events)
            .cloned()
            .ok_or_else(|| LedgerError::storage("movement decision produced no record"))?;
        for e in &events {
            article.apply(e);
        }

        sqlx::query("UPDATE articles SET stock = $2, warranty = $3 WHERE id = $1")
            .bind(request.article_id.as_str())
            .bind(article.stock())
            .bind(article.warranty())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_balance", e))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO movements (
                movement_date,
                article_id,
                display_name,
                direction,
                location,
                quantity,
                address,
                comment
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(new_movement.date)
        .bind(new_movement.article_id.as_str())
        .bind(&new_movement.display_name)
        .bind(new_movement.direction.as_str())
        .bind(new_movement.location.as_str())
        .bind(new_movement.quantity.get())
        .bind(new_movement.address.as_ref().map(|a| a.as_str()))
        .bind(new_movement.comment.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        commit(tx).await?;
        Ok(new_movement.into_recorded(id))
    }

    #[instrument(skip_all, fields(article_id = %id), err)]
    async fn get_article(&self, id: &ArticleId) -> LedgerResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, display_name, stock, warranty, reorder_threshold
            FROM articles
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_article", e))?;

        row.map(ArticleRow::into_article).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_articles(&self) -> LedgerResult<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, display_name, stock, warranty, reorder_threshold
            FROM articles
            ORDER BY id COLLATE "C"
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_articles", e))?;

        rows.into_iter().map(ArticleRow::into_article).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_movements(
        &self,
        article: Option<&ArticleId>,
        limit: usize,
    ) -> LedgerResult<Vec<Movement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT
                id,
                movement_date,
                article_id,
                display_name,
                direction,
                location,
                quantity,
                address,
                comment
            FROM movements
            WHERE ($1::text IS NULL OR article_id = $1)
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(article.map(|a| a.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.into_iter().map(MovementRow::into_movement).collect()
    }

    #[instrument(skip_all, fields(article_id = %id), err)]
    async fn delete_article(&self, id: &ArticleId) -> LedgerResult<()> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM movements WHERE article_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_movements", e))?;

        let deleted = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_article", e))?
            .rows_affected();

        if deleted == 0 {
            rollback(tx).await?;
            return Err(DomainError::not_found(format!("article {id}")).into());
        }

        commit(tx).await
    }

    #[instrument(skip_all, fields(address = %name), err)]
    async fn add_address(&self, name: &AddressName) -> LedgerResult<()> {
        sqlx::query("INSERT INTO addresses (name) VALUES ($1)")
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("add_address", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_addresses(&self) -> LedgerResult<Vec<AddressName>> {
        let names: Vec<String> =
            sqlx::query_scalar(r#"SELECT name FROM addresses ORDER BY name COLLATE "C""#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("list_addresses", e))?;

        names
            .into_iter()
            .map(|n| AddressName::parse(n).map_err(corrupt_row))
            .collect()
    }

    #[instrument(skip_all, fields(address = %name), err)]
    async fn delete_address(&self, name: &AddressName) -> LedgerResult<()> {
        let mut tx = self.begin().await?;

        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM addresses WHERE name = $1 FOR UPDATE")
                .bind(name.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_address", e))?;
        if found.is_none() {
            rollback(tx).await?;
            return Err(DomainError::not_found(format!("address {name}")).into());
        }

        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM movements WHERE address = $1)")
                .bind(name.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_address_references", e))?;
        if referenced {
            rollback(tx).await?;
            return Err(
                DomainError::conflict(format!("address {name} is referenced by movements")).into(),
            );
        }

        sqlx::query("DELETE FROM addresses WHERE name = $1")
            .bind(name.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_address", e))?;

        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn get_setting(&self, key: &str) -> LedgerResult<Option<String>> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_setting", e))
    }

    #[instrument(skip(self), err)]
    async fn set_setting(&self, key: &str, value: &str) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_setting", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn init_setting(&self, key: &str, value: &str) -> LedgerResult<String> {
        sqlx::query_scalar(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = settings.value
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("init_setting", e))
    }
}

async fn lock_article(
    tx: &mut Transaction<'static, Postgres>,
    id: &ArticleId,
) -> LedgerResult<Option<Article>> {
    let row = sqlx::query_as::<_, ArticleRow>(
        r#"
        SELECT id, display_name, stock, warranty, reorder_threshold
        FROM articles
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_article", e))?;

    row.map(ArticleRow::into_article).transpose()
}

async fn commit(tx: Transaction<'static, Postgres>) -> LedgerResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

async fn rollback(tx: Transaction<'static, Postgres>) -> LedgerResult<()> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))
}

/// Map SQLx errors to ledger errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(msg).into(),
                _ => LedgerError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Storage(format!("connection pool closed during {operation}"))
        }
        other => LedgerError::Storage(format!("{operation} failed: {other}")),
    }
}

fn corrupt_row(err: DomainError) -> LedgerError {
    LedgerError::Storage(format!("invalid row in ledger tables: {err}"))
}

// SQLx row types

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: String,
    display_name: String,
    stock: i64,
    warranty: i64,
    reorder_threshold: Option<i64>,
}

impl ArticleRow {
    fn into_article(self) -> LedgerResult<Article> {
        let id = ArticleId::parse(self.id).map_err(corrupt_row)?;
        let balance = Balance::new(self.stock, self.warranty).map_err(corrupt_row)?;
        Ok(Article::restore(
            id,
            self.display_name,
            balance,
            self.reorder_threshold,
        ))
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: i64,
    movement_date: NaiveDate,
    article_id: String,
    display_name: String,
    direction: String,
    location: String,
    quantity: i64,
    address: Option<String>,
    comment: Option<String>,
}

impl MovementRow {
    fn into_movement(self) -> LedgerResult<Movement> {
        let address = match self.address.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => Some(AddressName::parse(name).map_err(corrupt_row)?),
        };

        Ok(Movement {
            id: self.id,
            date: self.movement_date,
            article_id: ArticleId::parse(self.article_id).map_err(corrupt_row)?,
            display_name: self.display_name,
            direction: Direction::from_str(&self.direction).map_err(corrupt_row)?,
            location: Location::from_str(&self.location).map_err(corrupt_row)?,
            quantity: Quantity::new(self.quantity).map_err(corrupt_row)?,
            address,
            comment: self.comment.filter(|c| !c.trim().is_empty()),
        })
    }
}
