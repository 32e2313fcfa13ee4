//! Settings schema for the configuration facade.
//!
//! All fields have defaults so an empty settings file is valid. Path fields
//! are `Option<String>`: unset or `"default"` means `<conf_dir>/<file>.json`,
//! `""` or `"-"` switches the tier off.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::source::SourceLocation;

pub const DYN_FILE_NAME: &str = "dyn.json";
pub const LOCAL_FILE_NAME: &str = "local.json";
pub const STATE_FILE_NAME: &str = "state.json";

pub const DEFAULT_DYN_UPDATE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_DYN_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_CONF_LOAD_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_STATE_SAVE_PERIOD: Duration = Duration::from_secs(1);

/// Root settings for [`crate::LiveConf`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfSettings {
    /// Directory the default file paths are derived from.
    pub conf_dir: String,

    /// Name used in log output and as the environment variable prefix.
    pub app_name: String,

    /// Development mode flag, exposed to the application.
    pub dev_mode: bool,

    /// Dynamic config location (URL or path).
    pub dyn_conf_url: Option<String>,

    /// Local config path, read once at startup.
    pub local_conf_file: Option<String>,

    /// Persisted state path.
    pub state_file: Option<String>,

    /// Dynamic poll period in milliseconds (0 = 5s).
    pub dyn_update_period_ms: u64,

    /// Delay between initial Dynamic load attempts in milliseconds (0 = 2s).
    pub dyn_retry_delay_ms: u64,

    /// Timeout for the Local and State loads in milliseconds (0 = 15s).
    pub conf_load_timeout_ms: u64,

    /// State flush period in milliseconds (0 = 1s).
    pub state_save_period_ms: u64,
}

impl Default for ConfSettings {
    fn default() -> Self {
        Self {
            conf_dir: ".".to_string(),
            app_name: "liveconf".to_string(),
            dev_mode: false,
            dyn_conf_url: None,
            local_conf_file: None,
            state_file: None,
            dyn_update_period_ms: 0,
            dyn_retry_delay_ms: 0,
            conf_load_timeout_ms: 0,
            state_save_period_ms: 0,
        }
    }
}

impl ConfSettings {
    /// Settings rooted at `conf_dir`, everything else default.
    pub fn in_dir(conf_dir: impl Into<String>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            ..Self::default()
        }
    }

    /// Fill in every default and classify each location.
    pub fn resolve(&self) -> ResolvedSettings {
        ResolvedSettings {
            app_name: self.app_name.clone(),
            dev_mode: self.dev_mode,
            dyn_location: self.location_for(self.dyn_conf_url.as_deref(), DYN_FILE_NAME),
            local_location: self.location_for(self.local_conf_file.as_deref(), LOCAL_FILE_NAME),
            state_location: self.location_for(self.state_file.as_deref(), STATE_FILE_NAME),
            dyn_update_period: millis_or(self.dyn_update_period_ms, DEFAULT_DYN_UPDATE_PERIOD),
            dyn_retry_delay: millis_or(self.dyn_retry_delay_ms, DEFAULT_DYN_RETRY_DELAY),
            conf_load_timeout: millis_or(self.conf_load_timeout_ms, DEFAULT_CONF_LOAD_TIMEOUT),
            state_save_period: millis_or(self.state_save_period_ms, DEFAULT_STATE_SAVE_PERIOD),
        }
    }

    /// Whether any location falls back to `conf_dir`.
    pub fn uses_conf_dir(&self) -> bool {
        [&self.dyn_conf_url, &self.local_conf_file, &self.state_file]
            .iter()
            .any(|raw| is_default(raw.as_deref()))
    }

    fn location_for(&self, raw: Option<&str>, file_name: &str) -> SourceLocation {
        match raw {
            Some(raw) if !is_default(Some(raw)) => SourceLocation::parse(raw),
            _ => SourceLocation::File(PathBuf::from(&self.conf_dir).join(file_name)),
        }
    }
}

fn is_default(raw: Option<&str>) -> bool {
    matches!(raw, None | Some("default"))
}

fn millis_or(ms: u64, default: Duration) -> Duration {
    if ms == 0 {
        default
    } else {
        Duration::from_millis(ms)
    }
}

/// Settings with every default applied.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub app_name: String,
    pub dev_mode: bool,
    pub dyn_location: SourceLocation,
    pub local_location: SourceLocation,
    pub state_location: SourceLocation,
    pub dyn_update_period: Duration,
    pub dyn_retry_delay: Duration,
    pub conf_load_timeout: Duration,
    pub state_save_period: Duration,
}

impl ResolvedSettings {
    /// Path the State tier persists to, if persistence is on.
    pub fn state_path(&self) -> Option<&std::path::Path> {
        match &self.state_location {
            SourceLocation::File(path) => Some(path),
            _ => None,
        }
    }
}
