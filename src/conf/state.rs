//! Mutable, persisted State tier.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::autoload::json::parse_document;
use crate::error::{LoadError, PersistError};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::persist::{recover_interrupted, write_atomic};
use crate::source::{ContentFetcher, SourceLocation};

/// A JSON object shared between the application and the saver task.
///
/// Each call takes the lock once; a sequence of calls is not atomic.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    doc: Arc<RwLock<Map<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a document. Anything but an object yields an empty state.
    pub fn from_document(document: Value) -> Self {
        let map = match document {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            doc: Arc::new(RwLock::new(map)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.doc.read().get(key).cloned()
    }

    /// Deserialize one entry; `None` if missing or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        serde_json::from_value(value).ok()
    }

    /// Store `value` under `key`, returning what was there.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.doc.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.doc.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.doc.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.doc.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.read().is_empty()
    }

    /// Copy of the whole document.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.doc.read().clone())
    }

    /// The document as 2-space indented JSON.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let doc = self.doc.read();
        serde_json::to_vec_pretty(&*doc)
    }
}

/// Load the persisted state from `path`. Never fails: any problem is logged
/// and an empty state is returned.
pub async fn load_state(fetcher: &ContentFetcher, path: &Path, timeout: Duration) -> SharedState {
    if let Err(e) = recover_interrupted(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to check for interrupted state write");
    }

    match read_state(fetcher, path, timeout).await {
        Ok(document) => {
            let state = SharedState::from_document(document);
            tracing::info!(path = %path.display(), keys = state.len(), "State loaded");
            state
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to load state, starting with clear state"
            );
            SharedState::new()
        }
    }
}

async fn read_state(
    fetcher: &ContentFetcher,
    path: &Path,
    timeout: Duration,
) -> Result<Value, LoadError> {
    let location = SourceLocation::File(path.to_path_buf());
    let fetched = fetcher
        .fetch(&location, timeout)
        .await
        .map_err(|source| LoadError::Fetch {
            location: location.to_string(),
            source,
        })?;
    parse_document(&location.to_string(), &fetched.body)
}

/// On-disk home of the State tier.
///
/// Every write to the file goes through [`StateFile::save`], which holds an
/// async lock for the whole stage/retire/commit/cleanup sequence. The saver
/// loop, explicit saves and the final flush share one `StateFile`.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `state` and replace the file atomically.
    pub async fn save(&self, state: &SharedState) -> Result<(), PersistError> {
        let _guard = self.write_lock.lock().await;
        let bytes = state.to_pretty_bytes()?;
        let result = write_atomic(&self.path, &bytes).await.map_err(PersistError::from);
        metrics::record_state_save(result.is_ok());
        result
    }
}

/// Flush `state` every `period` until shutdown, then flush once more.
pub async fn run_saver(
    state: SharedState,
    file: Arc<StateFile>,
    period: Duration,
    mut shutdown: ShutdownSignal,
) {
    let path = file.path().display().to_string();
    tracing::info!(path = %path, period_ms = period.as_millis() as u64, "Starting state saving loop");
    loop {
        if let Err(e) = file.save(&state).await {
            tracing::error!(path = %path, error = %e, "Failed to save state");
        }

        tokio::select! {
            _ = sleep(period) => {}
            _ = shutdown.recv() => break,
        }
    }

    match file.save(&state).await {
        Ok(()) => tracing::info!(path = %path, "Final state flush complete"),
        Err(e) => tracing::error!(path = %path, error = %e, "Final state flush failed"),
    }
}
