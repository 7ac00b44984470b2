//! Configuration loading and representation.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 10;
pub const DEFAULT_HISTORY_LIMIT: usize = 300;
pub const DEFAULT_REORDER_THRESHOLD: i64 = 3;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Runtime settings of a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Lifetime of cached read views. Zero disables the cache.
    pub cache_ttl_secs: u64,
    /// Default number of rows returned by history listings.
    pub history_limit: usize,
    /// Global reorder threshold seeded into settings on first access.
    pub default_reorder_threshold: i64,
    pub max_connections: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_reorder_threshold: DEFAULT_REORDER_THRESHOLD,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl LedgerConfig {
    /// Load from `STOCKLEDGER_*` environment variables, falling back to defaults.
    ///
    /// `DATABASE_URL` is honored when `STOCKLEDGER_DATABASE_URL` is unset.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LedgerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.database_url = lookup("STOCKLEDGER_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        if let Some(raw) = lookup("STOCKLEDGER_CACHE_TTL_SECS") {
            config.cache_ttl_secs = parse_var("STOCKLEDGER_CACHE_TTL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("STOCKLEDGER_HISTORY_LIMIT") {
            config.history_limit = parse_var("STOCKLEDGER_HISTORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("STOCKLEDGER_DEFAULT_THRESHOLD") {
            config.default_reorder_threshold = parse_var("STOCKLEDGER_DEFAULT_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("STOCKLEDGER_MAX_CONNECTIONS") {
            config.max_connections = parse_var("STOCKLEDGER_MAX_CONNECTIONS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_reorder_threshold < 0 {
            anyhow::bail!(
                "default reorder threshold cannot be negative (got {})",
                self.default_reorder_threshold
            );
        }
        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value for {key}: '{raw}'"))
}
