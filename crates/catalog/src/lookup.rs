use std::sync::Arc;

use omnibase_store::StoreError;
use omnibase_store::repo::usage::UsageSnapshot;
use serde_json::Value;
use tracing::debug;

use crate::CanonicalRecord;
use crate::cache::{UsageBudgetedCache, cache_key};
use crate::normalize::normalize;
use crate::provider::CatalogProvider;

/// Cache-guarded title lookup against one provider in one region.
pub struct Catalog {
    provider: Arc<dyn CatalogProvider>,
    cache: UsageBudgetedCache,
    region: String,
}

impl Catalog {
    pub fn new(provider: Arc<dyn CatalogProvider>, cache: UsageBudgetedCache, region: String) -> Self {
        Self {
            provider,
            cache,
            region,
        }
    }

    /// Raw upstream payload for `title`, from cache when fresh.
    pub async fn payload(&self, title: &str) -> Option<Value> {
        let key = cache_key(title, &self.region);
        debug!(provider = self.provider.name(), title, key = %key, "catalog lookup");
        self.cache
            .get_or_fetch(&key, || self.provider.search(title, &self.region))
            .await
    }

    pub async fn lookup(&self, title: &str) -> Option<CanonicalRecord> {
        normalize(&self.payload(title).await?)
    }

    pub async fn would_exceed(&self, needed: u64) -> bool {
        self.cache.would_exceed(needed).await
    }

    pub async fn usage(&self) -> Result<UsageSnapshot, StoreError> {
        self.cache.usage().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use omnibase_core::clock::ManualClock;
    use omnibase_store::Store;
    use omnibase_store::repo::usage::UsageBudget;

    use super::*;
    use crate::CatalogError;

    /// Provider answering from a fixed table, recording every query.
    #[derive(Default)]
    pub struct StubProvider {
        pub answers: HashMap<String, Value>,
        pub queries: Mutex<Vec<(String, String)>>,
    }

    impl StubProvider {
        pub fn with(answers: &[(&str, Value)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn queried_titles(&self) -> Vec<String> {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .map(|(t, _)| t.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl CatalogProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, title: &str, region: &str) -> Result<Value, CatalogError> {
            self.queries
                .lock()
                .unwrap()
                .push((title.to_string(), region.to_string()));
            self.answers
                .get(title)
                .cloned()
                .ok_or(CatalogError::NotFound)
        }
    }

    pub fn catalog(
        provider: Arc<StubProvider>,
        limit: u64,
    ) -> (Catalog, Arc<ManualClock>, Store) {
        let store = Store::in_memory();
        let clock = Arc::new(ManualClock::new(1_700_000_000.0, "2025-01"));
        let budget = UsageBudget::new(store.clone(), clock.clone(), limit);
        let cache = UsageBudgetedCache::new(store.clone(), budget, clock.clone());
        (Catalog::new(provider, cache, "DE".into()), clock, store)
    }
}
