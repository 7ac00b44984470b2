//! Infrastructure layer for the balance ledger: storage, schema, settings and caching.

pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod settings;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
