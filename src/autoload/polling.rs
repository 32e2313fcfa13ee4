//! Poll-and-diff loader for raw bytes.
//!
//! # Phases
//! ```text
//! Initial: load → fail → sleep(retry_delay) → load → ... → success
//! Steady:  load → sleep(period) → load → ...   (one task, until shutdown)
//! ```
//! The steady loop sleeps after each fetch, so a cycle takes fetch time plus
//! the period; slow sources drift.

use arc_swap::ArcSwap;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::LoadError;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::source::{ContentFetcher, SourceLocation};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Called with `(previous, new)` whenever the fetched bytes change.
///
/// Runs on the loader's task while the loader's writer lock is held: it may
/// read [`PollingLoader::data`] but must not call [`PollingLoader::load_once`].
pub type UpdateHandler = Box<dyn Fn(&Bytes, &Bytes) + Send + Sync>;

/// Builder for [`PollingLoader`].
pub struct PollingLoaderBuilder {
    location: SourceLocation,
    period: Duration,
    retry_delay: Duration,
    handler: Option<UpdateHandler>,
    handle_first_time: bool,
    label: &'static str,
}

impl PollingLoaderBuilder {
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Poll period, also used as the per-fetch timeout. Zero means the default.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Delay between attempts of the initial load. Zero means the default.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn on_update<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Bytes, &Bytes) + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Whether the handler fires for the very first successful load.
    pub fn handle_first_time(mut self, handle: bool) -> Self {
        self.handle_first_time = handle;
        self
    }

    /// Name used in logs and metrics.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn build(self, fetcher: ContentFetcher) -> PollingLoader {
        let period = if self.period.is_zero() {
            DEFAULT_PERIOD
        } else {
            self.period
        };
        let retry_delay = if self.retry_delay.is_zero() {
            DEFAULT_RETRY_DELAY
        } else {
            self.retry_delay
        };

        PollingLoader {
            inner: Arc::new(LoaderInner {
                location: self.location,
                period,
                retry_delay,
                label: self.label,
                fetcher,
                handler: self.handler,
                handle_first_time: self.handle_first_time,
                snapshot: ArcSwap::from_pointee(Bytes::new()),
                failed: AtomicBool::new(false),
                writer: Mutex::new(()),
            }),
        }
    }
}

/// Keeps the latest bytes of one source location.
///
/// Cheap to clone; clones share the snapshot.
#[derive(Clone)]
pub struct PollingLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    location: SourceLocation,
    period: Duration,
    retry_delay: Duration,
    label: &'static str,
    fetcher: ContentFetcher,
    handler: Option<UpdateHandler>,
    handle_first_time: bool,
    snapshot: ArcSwap<Bytes>,
    failed: AtomicBool,
    /// Serializes fetch, compare, swap and notify.
    writer: Mutex<()>,
}

impl PollingLoader {
    pub fn builder(location: SourceLocation) -> PollingLoaderBuilder {
        PollingLoaderBuilder {
            location,
            period: DEFAULT_PERIOD,
            retry_delay: DEFAULT_RETRY_DELAY,
            handler: None,
            handle_first_time: false,
            label: "file",
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.inner.location
    }

    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// The last successfully fetched payload; empty before the first load.
    pub fn data(&self) -> Bytes {
        self.inner.snapshot.load().as_ref().clone()
    }

    /// Fetch once and notify the handler if the bytes changed.
    pub async fn load_once(&self) -> Result<(), LoadError> {
        self.inner.load(true).await
    }

    /// Run the initial phase, then spawn the steady loop.
    ///
    /// Resolves only after the first successful load. Returns `None` when the
    /// location is disabled or shutdown fires before the first success.
    pub async fn start(&self, mut shutdown: ShutdownSignal) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        if inner.location.is_disabled() {
            tracing::debug!(loader = inner.label, "Loader disabled");
            return None;
        }

        tracing::info!(loader = inner.label, location = %inner.location, "Trying to load");
        loop {
            match inner.load(inner.handle_first_time).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(
                        loader = inner.label,
                        error = %e,
                        retry_in_ms = inner.retry_delay.as_millis() as u64,
                        "Failed to load, retrying"
                    );
                    tokio::select! {
                        _ = sleep(inner.retry_delay) => {}
                        _ = shutdown.recv() => {
                            tracing::info!(loader = inner.label, "Shutdown before first successful load");
                            return None;
                        }
                    }
                }
            }
        }

        tracing::info!(
            loader = inner.label,
            location = %inner.location,
            period_ms = inner.period.as_millis() as u64,
            "Starting autoload loop"
        );
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(inner.run(shutdown)))
    }
}

impl LoaderInner {
    async fn run(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        loop {
            if let Err(e) = self.load(true).await {
                tracing::error!(loader = self.label, error = %e, "Failed to load");
            }

            tokio::select! {
                _ = sleep(self.period) => {}
                _ = shutdown.recv() => {
                    tracing::info!(loader = self.label, "Autoload loop received shutdown signal, exiting");
                    break;
                }
            }
        }
    }

    async fn load(&self, notify: bool) -> Result<(), LoadError> {
        let _writer = self.writer.lock().await;

        let fetched = match self.fetcher.fetch(&self.location, self.period).await {
            Ok(fetched) => fetched,
            Err(source) => {
                self.failed.store(true, Ordering::Relaxed);
                return Err(LoadError::Fetch {
                    location: self.location.to_string(),
                    source,
                });
            }
        };
        if !fetched.is_ok() {
            self.failed.store(true, Ordering::Relaxed);
            return Err(LoadError::BadStatus {
                location: self.location.to_string(),
                status: fetched.status,
            });
        }

        if self.failed.swap(false, Ordering::Relaxed) {
            tracing::info!(loader = self.label, location = %self.location, "Connection restored");
        }

        let previous = self.snapshot.load_full();
        if *previous == fetched.body {
            return Ok(());
        }
        self.snapshot.store(Arc::new(fetched.body.clone()));
        metrics::record_update(self.label);

        if notify {
            if let Some(handler) = &self.handler {
                handler(&previous, &fetched.body);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    type Seen = Arc<StdMutex<Vec<(Bytes, Bytes)>>>;

    fn recording_loader(path: &Path, handle_first_time: bool) -> (PollingLoader, Seen) {
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        let loader = PollingLoader::builder(SourceLocation::File(path.to_path_buf()))
            .period(Duration::from_secs(3600))
            .retry_delay(Duration::from_millis(20))
            .handle_first_time(handle_first_time)
            .on_update(move |old, new| sink.lock().unwrap().push((old.clone(), new.clone())))
            .build(ContentFetcher::new().unwrap());
        (loader, seen)
    }

    #[test]
    fn test_zero_durations_use_defaults() {
        let loader = PollingLoader::builder(SourceLocation::Disabled)
            .period(Duration::ZERO)
            .build(ContentFetcher::new().unwrap());
        assert_eq!(loader.period(), DEFAULT_PERIOD);
        assert!(loader.data().is_empty());
    }

    #[tokio::test]
    async fn test_change_fires_once_and_equal_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dyn.json");
        let (loader, seen) = recording_loader(&path, true);

        std::fs::write(&path, b"A").unwrap();
        loader.load_once().await.unwrap();
        std::fs::write(&path, b"B").unwrap();
        loader.load_once().await.unwrap();
        loader.load_once().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Bytes::new(), Bytes::from_static(b"A")));
        assert_eq!(seen[1], (Bytes::from_static(b"A"), Bytes::from_static(b"B")));
        assert_eq!(loader.data(), Bytes::from_static(b"B"));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dyn.json");
        let (loader, seen) = recording_loader(&path, true);

        std::fs::write(&path, b"A").unwrap();
        loader.load_once().await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = loader.load_once().await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch { .. }));
        assert_eq!(loader.data(), Bytes::from_static(b"A"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_first_load_suppressed_without_handle_first_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dyn.json");
        std::fs::write(&path, b"A").unwrap();
        let (loader, seen) = recording_loader(&path, false);

        let shutdown = Shutdown::new();
        let task = loader.start(shutdown.subscribe()).await;
        assert!(task.is_some());
        assert_eq!(loader.data(), Bytes::from_static(b"A"));
        assert!(seen.lock().unwrap().is_empty());

        std::fs::write(&path, b"B").unwrap();
        loader.load_once().await.unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[(Bytes::from_static(b"A"), Bytes::from_static(b"B"))]
        );

        shutdown.trigger();
        task.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_initial_phase_retries_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.json");
        let (loader, seen) = recording_loader(&path, true);

        let writer_path = path.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            let staged = writer_path.with_extension("tmp");
            std::fs::write(&staged, b"finally").unwrap();
            std::fs::rename(&staged, &writer_path).unwrap();
        });

        let shutdown = Shutdown::new();
        let task = tokio::time::timeout(Duration::from_secs(5), loader.start(shutdown.subscribe()))
            .await
            .expect("initial load should eventually succeed");
        assert_eq!(loader.data(), Bytes::from_static(b"finally"));
        assert_eq!(seen.lock().unwrap().len(), 1);

        shutdown.trigger();
        task.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_initial_phase() {
        let dir = tempfile::tempdir().unwrap();
        let (loader, _) = recording_loader(&dir.path().join("never.json"), true);

        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        let start = tokio::spawn(async move { loader.start(signal).await });
        sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let task = tokio::time::timeout(Duration::from_secs(1), start)
            .await
            .unwrap()
            .unwrap();
        assert!(task.is_none());
    }

    #[tokio::test]
    async fn test_disabled_location_does_nothing() {
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        let loader = PollingLoader::builder(SourceLocation::parse("-"))
            .on_update(move |old, new| sink.lock().unwrap().push((old.clone(), new.clone())))
            .handle_first_time(true)
            .build(ContentFetcher::new().unwrap());

        let shutdown = Shutdown::new();
        assert!(loader.start(shutdown.subscribe()).await.is_none());
        assert!(loader.data().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_handler_calls_never_overlap() {
        use std::sync::atomic::AtomicUsize;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.json");
        std::fs::write(&path, b"0").unwrap();

        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (b, o, c) = (busy.clone(), overlaps.clone(), calls.clone());
        let loader = PollingLoader::builder(SourceLocation::File(path.clone()))
            .period(Duration::from_millis(5))
            .handle_first_time(true)
            .on_update(move |_, _| {
                if b.swap(true, Ordering::SeqCst) {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                c.fetch_add(1, Ordering::SeqCst);
                b.store(false, Ordering::SeqCst);
            })
            .build(ContentFetcher::new().unwrap());

        let shutdown = Shutdown::new();
        let task = loader.start(shutdown.subscribe()).await.unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            let staged = writer_path.with_extension("tmp");
            for i in 1..=100 {
                std::fs::write(&staged, i.to_string()).unwrap();
                std::fs::rename(&staged, &writer_path).unwrap();
                sleep(Duration::from_millis(1)).await;
            }
        });
        let refreshers: Vec<_> = (0..4)
            .map(|_| {
                let loader = loader.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let _ = loader.load_once().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for refresher in refreshers {
            refresher.await.unwrap();
        }
        shutdown.trigger();
        task.await.unwrap();

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(calls.load(Ordering::SeqCst) > 1);
    }
}
