//! TTL cache in front of every outbound catalog call, coupled to the
//! monthly usage budget.
//!
//! Entries live in the `api_cache` document as `{key: payload}` with a
//! sibling `{key}_timestamp` holding the fetch time in epoch seconds.
//! Nothing is evicted; an entry older than the TTL is simply refetched and
//! overwritten on its next read.

use std::future::Future;
use std::sync::Arc;

use omnibase_core::clock::Clock;
use omnibase_store::repo::usage::{UsageBudget, UsageSnapshot};
use omnibase_store::{API_CACHE, Store, StoreError};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::CatalogError;

/// Seven days.
pub const CACHE_TTL_SECS: f64 = 604_800.0;

/// `lower(trim(title)) + "_" + discriminator`. The discriminator must carry
/// every other dimension that changes the upstream answer (region, catalog type).
pub fn cache_key(title: &str, discriminator: &str) -> String {
    format!("{}_{}", title.trim().to_lowercase(), discriminator)
}

fn timestamp_key(key: &str) -> String {
    format!("{key}_timestamp")
}

pub struct UsageBudgetedCache {
    store: Store,
    budget: UsageBudget,
    clock: Arc<dyn Clock>,
    ttl_secs: f64,
    // Serializes miss handling so the budget check, the counted fetch and
    // the cache write of one call never interleave with another's.
    fetch_lock: Mutex<()>,
}

impl UsageBudgetedCache {
    pub fn new(store: Store, budget: UsageBudget, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            budget,
            clock,
            ttl_secs: CACHE_TTL_SECS,
            fetch_lock: Mutex::new(()),
        }
    }

    /// True when `needed` more calls would push this month past the limit.
    /// An unreadable counter counts as exhausted.
    pub async fn would_exceed(&self, needed: u64) -> bool {
        match self.budget.would_exceed(needed).await {
            Ok(exceeded) => exceeded,
            Err(e) => {
                error!(error = %e, "could not read usage counter");
                true
            }
        }
    }

    pub async fn usage(&self) -> Result<UsageSnapshot, StoreError> {
        self.budget.snapshot().await
    }

    /// Fresh cached payload for `key`, or the result of `fetch` on a miss.
    ///
    /// A fetch only happens when the budget allows one more call. A
    /// successful fetch is counted and then cached; the count is persisted
    /// first, and a payload whose count could not be recorded is returned
    /// but not cached. Any failure yields `None`.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, CatalogError>>,
    {
        let _guard = self.fetch_lock.lock().await;
        let now = self.clock.now();

        let mut cache_readable = true;
        match self.store.load_map(API_CACHE).await {
            Ok(cache) => {
                if let Some(payload) = cache.get(key) {
                    let fetched_at = cache
                        .get(&timestamp_key(key))
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    if now - fetched_at < self.ttl_secs {
                        debug!(key, "catalog cache hit");
                        return Some(payload.clone());
                    }
                    debug!(key, age_secs = now - fetched_at, "catalog cache entry is stale");
                }
            }
            Err(e) => {
                error!(key, error = %e, "catalog cache unreadable, result will not be cached");
                cache_readable = false;
            }
        }

        if self.would_exceed(1).await {
            warn!(key, "monthly catalog budget exhausted, skipping lookup");
            return None;
        }

        let payload = match fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "catalog lookup failed");
                return None;
            }
        };

        if let Err(e) = self.budget.increment().await {
            error!(key, error = %e, "could not record catalog call, result will not be cached");
            return Some(payload);
        }

        if cache_readable {
            let stored = payload.clone();
            let ts_key = timestamp_key(key);
            let write = self
                .store
                .update_map(API_CACHE, |cache| {
                    cache.insert(key.to_string(), stored);
                    cache.insert(ts_key, json!(now));
                })
                .await;
            if let Err(e) = write {
                error!(key, error = %e, "could not persist catalog cache");
            }
        }

        Some(payload)
    }
}
