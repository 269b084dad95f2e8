use std::sync::Arc;

use omnibase_catalog::import::ImportOrchestrator;
use omnibase_catalog::lookup::Catalog;
use omnibase_core::clock::Clock;
use omnibase_store::Store;
use omnibase_store::repo::settings::SettingsRepo;
use tokio::sync::broadcast;

use crate::ai::CompletionProvider;

/// Server-sent event types.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "import_progress")]
    ImportProgress {
        processed: usize,
        total: usize,
        title: String,
        skipped: bool,
    },
    #[serde(rename = "import_complete")]
    ImportComplete { imported: usize, skipped: usize },
    #[serde(rename = "heartbeat")]
    Heartbeat { seq: u64 },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ImportProgress { .. } => "import_progress",
            Self::ImportComplete { .. } => "import_complete",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub settings: SettingsRepo,
    pub catalog: Arc<Catalog>,
    pub importer: Arc<ImportOrchestrator>,
    pub ai: Arc<dyn CompletionProvider>,
    pub clock: Arc<dyn Clock>,
    pub events: broadcast::Sender<ServerEvent>,
}
