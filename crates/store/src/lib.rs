pub mod backend;
pub mod repo;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use backend::{FileBackend, JsonBackend, MemoryBackend};

/// Document holding the stored movie/series collection.
pub const MOVIES: &str = "movies";
/// Document holding raw catalog payloads and their fetch timestamps.
pub const API_CACHE: &str = "api_cache";
/// Document holding user settings and the monthly usage counter.
pub const SETTINGS: &str = "settings";
/// UI strings keyed by language code; maintained by hand, only read here.
pub const TRANSLATIONS: &str = "language_translations";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document {name} is not a JSON {expected}")]
    Shape { name: String, expected: &'static str },
}

/// Whole-document JSON persistence with one lock per document.
///
/// `load_*`/`save_*` never take the lock themselves. Callers doing a
/// load-mutate-save sequence hold [`Store::lock`] for its duration, or use
/// [`Store::update_map`] which does so internally. Calling `update_map`
/// while already holding the lock for the same document deadlocks.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn JsonBackend>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Store {
    pub fn new(backend: Arc<dyn JsonBackend>) -> Self {
        Self {
            backend,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let doc_lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(name.to_string()).or_default().clone()
        };
        doc_lock.lock_owned().await
    }

    pub async fn load_list(&self, name: &str) -> Result<Vec<Value>, StoreError> {
        match self.backend.read(name).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(StoreError::Shape {
                name: name.to_string(),
                expected: "array",
            }),
        }
    }

    pub async fn save_list(&self, name: &str, items: &[Value]) -> Result<(), StoreError> {
        self.backend
            .write(name, &Value::Array(items.to_vec()))
            .await
    }

    pub async fn load_map(&self, name: &str) -> Result<Map<String, Value>, StoreError> {
        match self.backend.read(name).await? {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(StoreError::Shape {
                name: name.to_string(),
                expected: "object",
            }),
        }
    }

    pub async fn save_map(&self, name: &str, map: &Map<String, Value>) -> Result<(), StoreError> {
        self.backend.write(name, &Value::Object(map.clone())).await
    }

    /// Atomic read-modify-write of a map document. Writes only when `f`
    /// actually changed the map.
    pub async fn update_map<T, F>(&self, name: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Map<String, Value>) -> T,
    {
        let _guard = self.lock(name).await;
        let mut map = self.load_map(name).await?;
        let before = map.clone();
        let out = f(&mut map);
        if map != before {
            self.save_map(name, &map).await?;
        }
        Ok(out)
    }
}
