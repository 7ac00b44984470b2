//! Typed access to the named key/value settings table.
//!
//! Values are stored as JSON text, so a plain integer setting reads back from
//! rows written as `"3"` by earlier tooling.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

/// Global fallback for articles without their own reorder threshold.
pub const REORDER_THRESHOLD_KEY: &str = "reorder_threshold";

/// Read `key`, storing `default` first if the key has never been set.
///
/// A stored value that no longer decodes as `T` yields `default` (logged).
pub async fn get_or_init<S, T>(store: &S, key: &str, default: T) -> LedgerResult<T>
where
    S: LedgerStore + ?Sized,
    T: Serialize + DeserializeOwned,
{
    let encoded = encode(key, &default)?;
    let stored = store.init_setting(key, &encoded).await?;

    match serde_json::from_str(&stored) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(key, stored = %stored, "unreadable setting, using default: {err}");
            Ok(default)
        }
    }
}

pub async fn set<S, T>(store: &S, key: &str, value: &T) -> LedgerResult<()>
where
    S: LedgerStore + ?Sized,
    T: Serialize,
{
    let encoded = encode(key, value)?;
    store.set_setting(key, &encoded).await
}

fn encode<T: Serialize>(key: &str, value: &T) -> LedgerResult<String> {
    serde_json::to_string(value)
        .map_err(|e| LedgerError::storage(format!("cannot encode setting {key}: {e}")))
}
