//! Turns classified history titles into stored records.
//!
//! Every candidate is accounted for: titles already in the collection are
//! skipped, everything else becomes a record, enriched from the catalog
//! when the lookup succeeds and a local placeholder when it does not.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use omnibase_core::clock::Clock;
use omnibase_core::types::{MediaKind, NETFLIX_IMPORT_SOURCE};
use omnibase_history::Classification;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::CanonicalRecord;
use crate::lookup::Catalog;

/// Delay between successive catalog lookups.
pub const DEFAULT_PACE: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("importing {needed} titles would exceed the monthly catalog budget")]
    BudgetExhausted { needed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCandidate {
    /// Title the stored record gets, and the deduplication key.
    pub title: String,
    /// Title sent to the catalog.
    pub lookup: String,
    pub kind: MediaKind,
}

impl ImportCandidate {
    pub fn movie(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lookup: title.to_string(),
            kind: MediaKind::Movie,
        }
    }

    /// Stored under the full season label, looked up by bare name.
    pub fn series(label: &str, name: &str) -> Self {
        Self {
            title: label.to_string(),
            lookup: name.to_string(),
            kind: MediaKind::Series,
        }
    }
}

/// Movies first, then series, each in classification order.
pub fn candidates_from(classification: &Classification) -> Vec<ImportCandidate> {
    classification
        .movies
        .iter()
        .map(|title| ImportCandidate::movie(title))
        .chain(
            classification
                .series
                .iter()
                .map(|entry| ImportCandidate::series(&entry.label(), &entry.name)),
        )
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportProgress<'a> {
    pub processed: usize,
    pub total: usize,
    pub title: &'a str,
    pub skipped: bool,
}

pub struct ImportOrchestrator {
    catalog: Arc<Catalog>,
    clock: Arc<dyn Clock>,
    pace: Duration,
}

impl ImportOrchestrator {
    pub fn new(catalog: Arc<Catalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog,
            clock,
            pace: DEFAULT_PACE,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Refuse the whole batch up front when it cannot fit this month's budget.
    pub async fn preflight(&self, needed: usize) -> Result<(), ImportError> {
        if self.catalog.would_exceed(needed as u64).await {
            return Err(ImportError::BudgetExhausted { needed });
        }
        Ok(())
    }

    pub async fn import(
        &self,
        candidates: &[ImportCandidate],
        existing: &[Value],
    ) -> Result<ImportOutcome, ImportError> {
        self.import_with_progress(candidates, existing, |_| {}).await
    }

    /// Import `candidates` in order. `existing` is only read; new records are
    /// returned for the caller to persist.
    pub async fn import_with_progress<F>(
        &self,
        candidates: &[ImportCandidate],
        existing: &[Value],
        mut progress: F,
    ) -> Result<ImportOutcome, ImportError>
    where
        F: FnMut(ImportProgress<'_>) + Send,
    {
        self.preflight(candidates.len()).await?;

        let mut known: HashSet<String> = existing
            .iter()
            .filter_map(|r| r.get("title").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        let mut outcome = ImportOutcome::default();

        for (index, candidate) in candidates.iter().enumerate() {
            let report = move |skipped| ImportProgress {
                processed: index + 1,
                total: candidates.len(),
                title: &candidate.title,
                skipped,
            };

            if known.contains(&candidate.title) {
                outcome.skipped += 1;
                progress(report(true));
                continue;
            }

            let mut record = match self.catalog.lookup(&candidate.lookup).await {
                Some(found) => enriched(found, candidate),
                None => {
                    warn!(title = %candidate.title, "no catalog data, storing placeholder");
                    placeholder(candidate)
                }
            };

            // Base id is wall-clock; the running count keeps ids strictly increasing.
            let id = self.clock.now() + outcome.imported as f64;
            record.insert("id".into(), json!(id));
            record.insert("createdAt".into(), json!(self.clock.now_rfc3339()));
            record.insert("source".into(), json!(NETFLIX_IMPORT_SOURCE));

            known.insert(candidate.title.clone());
            outcome.records.push(Value::Object(record));
            outcome.imported += 1;
            progress(report(false));

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }

        info!(
            imported = outcome.imported,
            skipped = outcome.skipped,
            "history import finished"
        );
        Ok(outcome)
    }
}

fn enriched(found: CanonicalRecord, candidate: &ImportCandidate) -> Map<String, Value> {
    let mut record = match serde_json::to_value(found) {
        Ok(Value::Object(map)) => map,
        _ => return placeholder(candidate),
    };
    record.insert("title".into(), json!(candidate.title));
    if candidate.kind == MediaKind::Series {
        record.insert("type".into(), json!(MediaKind::Series));
    }
    record
}

fn placeholder(candidate: &ImportCandidate) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("title".into(), json!(candidate.title));
    record.insert("rating".into(), json!(0));
    record.insert("type".into(), json!(candidate.kind));
    record
}
