//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Which per-article counter a balance check refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceCounter {
    Stock,
    Warranty,
}

impl BalanceCounter {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceCounter::Stock => "stock",
            BalanceCounter::Warranty => "warranty",
        }
    }
}

impl core::fmt::Display for BalanceCounter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// balances, lookups, conflicts). Storage failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty identifier, non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The movement would drive a counter below zero.
    #[error(
        "insufficient {counter} for article {article}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        article: String,
        counter: BalanceCounter,
        available: i64,
        requested: i64,
    },

    /// A referenced article or address does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or reference rule was violated (duplicate name, rename collision).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient(
        article: impl Into<String>,
        counter: BalanceCounter,
        available: i64,
        requested: i64,
    ) -> Self {
        Self::InsufficientBalance {
            article: article.into(),
            counter,
            available,
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_message_reports_available_quantity() {
        let err = DomainError::insufficient("155082", BalanceCounter::Stock, 0, 1);
        assert_eq!(
            err.to_string(),
            "insufficient stock for article 155082: available 0, requested 1"
        );
    }
}
