use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::StoreError;

/// Raw document access. A missing document reads as `None`.
#[async_trait::async_trait]
pub trait JsonBackend: Send + Sync {
    async fn read(&self, name: &str) -> Result<Option<Value>, StoreError>;

    async fn write(&self, name: &str, doc: &Value) -> Result<(), StoreError>;
}

/// One `<name>.json` file per document inside `dir`.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait::async_trait]
impl JsonBackend for FileBackend {
    async fn read(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, doc: &Value) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Human-readable, 4-space indented, non-ASCII kept as-is.
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        doc.serialize(&mut ser)?;

        let path = self.path_for(name);
        let tmp = self
            .dir
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &buf).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), bytes = buf.len(), "document written");
        Ok(())
    }
}

/// In-process backend for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, Value>>,
    writes: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryBackend {
    /// Make every subsequent write of `name` fail with an io error.
    pub fn fail_writes(&self, name: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(name.to_string());
        }
    }

    pub fn write_count(&self, name: &str) -> usize {
        self.writes
            .lock()
            .map(|w| w.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(std::io::Error::other("memory backend lock poisoned"))
}

#[async_trait::async_trait]
impl JsonBackend for MemoryBackend {
    async fn read(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let docs = self.docs.lock().map_err(|_| poisoned())?;
        Ok(docs.get(name).cloned())
    }

    async fn write(&self, name: &str, doc: &Value) -> Result<(), StoreError> {
        if self.failing.lock().map_err(|_| poisoned())?.contains(name) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "write to {name} refused"
            ))));
        }
        self.docs
            .lock()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), doc.clone());
        *self
            .writes
            .lock()
            .map_err(|_| poisoned())?
            .entry(name.to_string())
            .or_default() += 1;
        Ok(())
    }
}
