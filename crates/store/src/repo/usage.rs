//! Monthly ceiling on outbound catalog calls, shared by every catalog type.
//!
//! The counter is only meaningful relative to its reset month: every read
//! or write first rolls it back to zero when the calendar month moved on.

use std::sync::Arc;

use omnibase_core::clock::Clock;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::{SETTINGS, Store, StoreError};

pub const DEFAULT_MONTHLY_LIMIT: u64 = 1000;

pub(crate) const COUNT_KEY: &str = "api_usage_count";
pub(crate) const MONTH_KEY: &str = "last_reset_month";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub usage_count: u64,
    pub limit: u64,
    pub percentage: f64,
}

#[derive(Clone)]
pub struct UsageBudget {
    store: Store,
    clock: Arc<dyn Clock>,
    limit: u64,
}

fn roll_month(map: &mut Map<String, Value>, month: &str) -> u64 {
    if map.get(MONTH_KEY).and_then(Value::as_str) != Some(month) {
        info!(month, "monthly catalog usage counter reset");
        map.insert(COUNT_KEY.into(), json!(0));
        map.insert(MONTH_KEY.into(), json!(month));
        return 0;
    }
    map.get(COUNT_KEY).and_then(Value::as_u64).unwrap_or(0)
}

impl UsageBudget {
    pub fn new(store: Store, clock: Arc<dyn Clock>, limit: u64) -> Self {
        Self {
            store,
            clock,
            limit,
        }
    }

    /// Calls made in the current month.
    pub async fn current(&self) -> Result<u64, StoreError> {
        let month = self.clock.current_month();
        self.store
            .update_map(SETTINGS, |map| roll_month(map, &month))
            .await
    }

    pub async fn would_exceed(&self, needed: u64) -> Result<bool, StoreError> {
        let current = self.current().await?;
        Ok(current.checked_add(needed).is_none_or(|total| total > self.limit))
    }

    /// Count one call against the current month. Returns the new count.
    pub async fn increment(&self) -> Result<u64, StoreError> {
        let month = self.clock.current_month();
        self.store
            .update_map(SETTINGS, |map| {
                let next = roll_month(map, &month) + 1;
                map.insert(COUNT_KEY.into(), json!(next));
                next
            })
            .await
    }

    pub async fn snapshot(&self) -> Result<UsageSnapshot, StoreError> {
        let usage_count = self.current().await?;
        Ok(UsageSnapshot {
            usage_count,
            limit: self.limit,
            percentage: if self.limit == 0 {
                100.0
            } else {
                usage_count as f64 / self.limit as f64 * 100.0
            },
        })
    }
}
