//! Short-lived read-through cache for advisory read views.
//!
//! Only aggregate queries (article list, history, addresses) go through here.
//! Mutations never read from it; they clear it after committing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use stockledger_core::{AddressName, ArticleId};
use stockledger_inventory::{Article, Movement};

/// Identity of a cached read view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Articles,
    Movements {
        article: Option<ArticleId>,
        limit: usize,
    },
    Addresses,
}

/// A cached view. Shared via `Arc` so hits are cheap clones.
#[derive(Debug, Clone)]
pub enum CachedView {
    Articles(Arc<Vec<Article>>),
    Movements(Arc<Vec<Movement>>),
    Addresses(Arc<Vec<AddressName>>),
}

#[derive(Debug)]
struct Entry {
    stored_at: Instant,
    view: CachedView,
}

/// TTL cache keyed by [`ViewKey`].
///
/// Every invalidation bumps a generation counter. A load that started before
/// an invalidation is not stored, so a slow read cannot re-populate the cache
/// with pre-mutation data.
#[derive(Debug)]
pub struct ReadCache {
    ttl: Duration,
    generation: AtomicU64,
    entries: RwLock<HashMap<ViewKey, Entry>>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Token to pass back to [`ReadCache::put`] after loading.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &ViewKey) -> Option<CachedView> {
        if !self.is_enabled() {
            return None;
        }
        let map = self.entries.read().ok()?;
        let entry = map.get(key)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.view.clone())
    }

    /// Store a freshly loaded view unless the cache was invalidated since `generation`.
    pub fn put(&self, key: ViewKey, view: CachedView, generation: u64) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(mut map) = self.entries.write() {
            if self.generation.load(Ordering::Acquire) != generation {
                return;
            }
            map.retain(|_, e| e.stored_at.elapsed() < self.ttl);
            map.insert(
                key,
                Entry {
                    stored_at: Instant::now(),
                    view,
                },
            );
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut map) = self.entries.write() {
            self.generation.fetch_add(1, Ordering::AcqRel);
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
