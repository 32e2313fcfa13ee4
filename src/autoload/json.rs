//! JSON specialization of the polling loader.

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::autoload::polling::{PollingLoader, PollingLoaderBuilder};
use crate::error::LoadError;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::source::{ContentFetcher, SourceLocation};

/// Called with `(previous, new)` documents after a changed payload parses.
pub type JsonUpdateHandler = Box<dyn Fn(Arc<Value>, Arc<Value>) + Send + Sync>;

/// Parse a payload that must hold a JSON object at the top level.
pub fn parse_document(location: &str, bytes: &[u8]) -> Result<Value, LoadError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| LoadError::Parse {
        location: location.to_string(),
        source,
    })?;
    if !value.is_object() {
        return Err(LoadError::NotAnObject {
            location: location.to_string(),
        });
    }
    Ok(value)
}

/// `{}`.
pub fn empty_document() -> Value {
    Value::Object(Map::new())
}

/// Builder for [`JsonPollingLoader`].
pub struct JsonPollingLoaderBuilder {
    bytes: PollingLoaderBuilder,
    handler: Option<JsonUpdateHandler>,
    handle_first_time: bool,
}

impl JsonPollingLoaderBuilder {
    pub fn period(mut self, period: Duration) -> Self {
        self.bytes = self.bytes.period(period);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.bytes = self.bytes.retry_delay(delay);
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.bytes = self.bytes.label(label);
        self
    }

    pub fn on_update<F>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Value>, Arc<Value>) + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Whether the handler fires for the first document that parses.
    pub fn handle_first_time(mut self, handle: bool) -> Self {
        self.handle_first_time = handle;
        self
    }

    pub fn build(self, fetcher: ContentFetcher) -> JsonPollingLoader {
        let document = Arc::new(ArcSwap::from_pointee(empty_document()));
        // Independent of the byte-level first-load suppression, which is
        // always off for the inner loader.
        let notify_next = AtomicBool::new(self.handle_first_time);
        let handler = self.handler;

        let slot = Arc::clone(&document);
        let location = self.bytes.location().to_string();
        let bytes = self.bytes.handle_first_time(true).on_update(move |_, new| {
            let parsed = match parse_document(&location, new) {
                Ok(parsed) => Arc::new(parsed),
                Err(e) => {
                    metrics::record_parse_failure();
                    tracing::warn!(
                        location = %location,
                        error = %e,
                        "Failed to parse loaded JSON, keeping previous document"
                    );
                    return;
                }
            };
            tracing::info!(location = %location, "Modification detected");

            let previous = slot.swap(Arc::clone(&parsed));
            let allowed = notify_next.swap(true, Ordering::Relaxed);
            if let (true, Some(handler)) = (allowed, &handler) {
                handler(previous, parsed);
            }
        });

        JsonPollingLoader {
            bytes: bytes.build(fetcher),
            document,
        }
    }
}

/// Keeps the latest successfully parsed JSON document of one location.
#[derive(Clone)]
pub struct JsonPollingLoader {
    bytes: PollingLoader,
    document: Arc<ArcSwap<Value>>,
}

impl JsonPollingLoader {
    pub fn builder(location: SourceLocation) -> JsonPollingLoaderBuilder {
        JsonPollingLoaderBuilder {
            bytes: PollingLoader::builder(location).label("json"),
            handler: None,
            handle_first_time: false,
        }
    }

    /// Current document, read-only. `{}` until something parses.
    pub fn data(&self) -> Arc<Value> {
        self.document.load_full()
    }

    /// Raw bytes of the last fetch, which may not have parsed.
    pub fn raw(&self) -> bytes::Bytes {
        self.bytes.data()
    }

    pub fn location(&self) -> &SourceLocation {
        self.bytes.location()
    }

    pub async fn load_once(&self) -> Result<(), LoadError> {
        self.bytes.load_once().await
    }

    /// See [`PollingLoader::start`].
    pub async fn start(&self, shutdown: ShutdownSignal) -> Option<JoinHandle<()>> {
        self.bytes.start(shutdown).await
    }
}
