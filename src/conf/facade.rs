//! Three-tier configuration facade.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

use crate::autoload::json::{empty_document, parse_document};
use crate::autoload::JsonPollingLoader;
use crate::config::{validate_settings, ConfSettings, ResolvedSettings};
use crate::conf::state::{load_state, run_saver, SharedState, StateFile};
use crate::error::{ConfError, LoadError, PersistError};
use crate::lifecycle::Shutdown;
use crate::source::ContentFetcher;

/// Called after the Dynamic document changes, with the facade and the
/// previous document.
pub type DynUpdateHandler = Box<dyn Fn(&LiveConf, Arc<Value>) + Send + Sync>;

/// Local, Dynamic and State configuration of one process.
///
/// Cheap to clone; clones share every tier and background task.
#[derive(Clone)]
pub struct LiveConf {
    inner: Arc<ConfInner>,
}

struct ConfInner {
    settings: ResolvedSettings,
    local: Arc<Value>,
    dynamic: JsonPollingLoader,
    state: SharedState,
    state_file: Option<Arc<StateFile>>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LiveConf {
    /// Load every tier without a Dynamic update handler.
    pub async fn load(settings: ConfSettings) -> Result<Self, ConfError> {
        Self::load_inner(settings, None).await
    }

    /// Load every tier; `handler` runs on each later Dynamic change.
    pub async fn load_with_handler<F>(settings: ConfSettings, handler: F) -> Result<Self, ConfError>
    where
        F: Fn(&LiveConf, Arc<Value>) + Send + Sync + 'static,
    {
        Self::load_inner(settings, Some(Box::new(handler))).await
    }

    /// Local first (fatal on error), then State (never fatal) and its saver,
    /// then Dynamic, which resolves only after its first successful fetch.
    async fn load_inner(
        settings: ConfSettings,
        handler: Option<DynUpdateHandler>,
    ) -> Result<Self, ConfError> {
        validate_settings(&settings).map_err(ConfError::Invalid)?;
        let settings = settings.resolve();
        let fetcher = ContentFetcher::new().map_err(ConfError::Client)?;

        let local = if settings.local_location.is_disabled() {
            empty_document()
        } else {
            tracing::info!(app = %settings.app_name, location = %settings.local_location, "Loading local configuration");
            load_local(&fetcher, &settings).await.map_err(ConfError::Local)?
        };

        let shutdown = Shutdown::new();
        let mut tasks = Vec::new();
        let (state, state_file) = match settings.state_path() {
            Some(path) => {
                tracing::info!(app = %settings.app_name, path = %path.display(), "Loading state");
                let state = load_state(&fetcher, path, settings.conf_load_timeout).await;
                let file = Arc::new(StateFile::new(path));
                tasks.push(tokio::spawn(run_saver(
                    state.clone(),
                    Arc::clone(&file),
                    settings.state_save_period,
                    shutdown.subscribe(),
                )));
                (state, Some(file))
            }
            None => (SharedState::new(), None),
        };

        let inner = Arc::new_cyclic(|weak: &Weak<ConfInner>| {
            let weak = weak.clone();
            let dynamic = JsonPollingLoader::builder(settings.dyn_location.clone())
                .label("dynamic")
                .period(settings.dyn_update_period)
                .retry_delay(settings.dyn_retry_delay)
                .handle_first_time(false)
                .on_update(move |previous, _| {
                    if let (Some(handler), Some(inner)) = (&handler, weak.upgrade()) {
                        handler(&LiveConf { inner }, previous);
                    }
                })
                .build(fetcher);

            ConfInner {
                settings,
                local: Arc::new(local),
                dynamic,
                state,
                state_file,
                shutdown,
                tasks: Mutex::new(tasks),
            }
        });
        let conf = LiveConf { inner };

        if let Some(task) = conf.inner.dynamic.start(conf.inner.shutdown.subscribe()).await {
            conf.inner.tasks.lock().push(task);
        }

        tracing::info!(app = %conf.inner.settings.app_name, "Configuration has been loaded");
        Ok(conf)
    }

    /// Local tier, loaded once at startup.
    pub fn local(&self) -> Arc<Value> {
        Arc::clone(&self.inner.local)
    }

    /// Current Dynamic document.
    pub fn dynamic(&self) -> Arc<Value> {
        self.inner.dynamic.data()
    }

    /// Deserialize the current Dynamic document into `T`.
    pub fn dynamic_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.dynamic().as_ref())
    }

    /// Deserialize the Local document into `T`.
    pub fn local_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.inner.local.as_ref())
    }

    /// Mutable State tier.
    pub fn state(&self) -> &SharedState {
        &self.inner.state
    }

    pub fn settings(&self) -> &ResolvedSettings {
        &self.inner.settings
    }

    pub fn dev_mode(&self) -> bool {
        self.inner.settings.dev_mode
    }

    /// Write the State tier now, outside the periodic cycle. A no-op when
    /// persistence is disabled.
    pub async fn save_state(&self) -> Result<(), PersistError> {
        match &self.inner.state_file {
            Some(file) => file.save(&self.inner.state).await,
            None => Ok(()),
        }
    }

    /// Stop the background loops and wait for them; the state saver flushes
    /// one last time on the way out.
    pub async fn close(&self) {
        self.inner.shutdown.trigger();
        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!(app = %self.inner.settings.app_name, "Configuration closed");
    }
}

async fn load_local(fetcher: &ContentFetcher, settings: &ResolvedSettings) -> Result<Value, LoadError> {
    let location = &settings.local_location;
    let fetched = fetcher
        .fetch(location, settings.conf_load_timeout)
        .await
        .map_err(|source| LoadError::Fetch {
            location: location.to_string(),
            source,
        })?;
    if !fetched.is_ok() {
        return Err(LoadError::BadStatus {
            location: location.to_string(),
            status: fetched.status,
        });
    }
    parse_document(&location.to_string(), &fetched.body)
}
