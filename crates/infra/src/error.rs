//! Ledger operation errors.

use stockledger_core::DomainError;
use thiserror::Error;

/// Error returned by every ledger operation.
///
/// `Domain` errors are per-request rejections the caller can correct and
/// resubmit. `Storage` errors mean the backing store failed; the enclosing
/// transaction has been rolled back and no partial state remains.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// `true` when the caller can fix the request and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::Domain(_))
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
