//! Versioned, idempotent schema evolution for the Postgres store.
//!
//! Every statement is written so that re-running it against an already
//! migrated (or partially migrated) database is harmless, and applied versions
//! are recorded in `schema_migrations`. Run once at startup, before the ledger
//! serves requests.

use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::{LedgerError, LedgerResult};

/// Advisory lock key serializing concurrent migration runs.
const MIGRATION_LOCK_KEY: i64 = 0x5354_4f43_4b4c_4447;

/// One schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_ledger_tables",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id           TEXT PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                stock        BIGINT NOT NULL DEFAULT 0 CHECK (stock >= 0),
                warranty     BIGINT NOT NULL DEFAULT 0 CHECK (warranty >= 0)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS addresses (
                id   BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS movements (
                id            BIGSERIAL PRIMARY KEY,
                movement_date DATE NOT NULL,
                article_id    TEXT NOT NULL
                              REFERENCES articles (id) ON DELETE CASCADE ON UPDATE CASCADE,
                display_name  TEXT NOT NULL DEFAULT '',
                direction     TEXT NOT NULL,
                location      TEXT NOT NULL DEFAULT 'STOCK',
                quantity      BIGINT NOT NULL CHECK (quantity > 0)
            )
            "#,
        ],
    },
    Migration {
        version: 2,
        name: "article_reorder_threshold",
        statements: &[
            "ALTER TABLE articles ADD COLUMN IF NOT EXISTS reorder_threshold BIGINT NULL CHECK (reorder_threshold >= 0)",
        ],
    },
    Migration {
        version: 3,
        name: "movement_address_and_comment",
        statements: &[
            "ALTER TABLE movements ADD COLUMN IF NOT EXISTS address TEXT NULL",
            "ALTER TABLE movements ADD COLUMN IF NOT EXISTS comment TEXT NULL",
        ],
    },
    Migration {
        version: 4,
        name: "movement_indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_movements_article ON movements (article_id)",
            "CREATE INDEX IF NOT EXISTS idx_movements_date ON movements (movement_date)",
            "CREATE INDEX IF NOT EXISTS idx_movements_address ON movements (address)",
        ],
    },
];

/// Apply every pending migration. Returns the versions applied by this call.
#[instrument(skip_all, err)]
pub async fn run_migrations(pool: &PgPool) -> LedgerResult<Vec<i64>> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    BIGINT PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| migration_error("create_schema_migrations", e))?;

    let mut applied = Vec::new();
    for migration in MIGRATIONS {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| migration_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| migration_error("advisory_lock", e))?;

        let done: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = $1)")
                .bind(migration.version)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| migration_error(migration.name, e))?;
        if done {
            continue;
        }

        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| migration_error(migration.name, e))?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| migration_error(migration.name, e))?;

        tx.commit()
            .await
            .map_err(|e| migration_error("commit_transaction", e))?;

        info!(version = migration.version, name = migration.name, "applied schema migration");
        applied.push(migration.version);
    }

    Ok(applied)
}

/// Versions recorded as applied, ascending.
pub async fn applied_versions(pool: &PgPool) -> LedgerResult<Vec<i64>> {
    sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| migration_error("applied_versions", e))
}

fn migration_error(step: &str, err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(format!("migration step {step} failed: {err}"))
}
