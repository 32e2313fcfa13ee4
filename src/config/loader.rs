//! Settings loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ConfSettings;
use crate::config::validation::{validate_settings, ValidationError};
use crate::error::join_errors;

/// Errors raised while reading a settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// Load and validate settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<ConfSettings, SettingsError> {
    let content = fs::read_to_string(path)?;
    let settings: ConfSettings = toml::from_str(&content)?;
    validate_settings(&settings).map_err(SettingsError::Validation)?;

    Ok(settings)
}

/// Prefix of the environment overrides for `app_name`: upper-cased, with
/// anything but ASCII letters and digits turned into `_`.
pub fn env_prefix(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Apply `<APP>_CONFPATH`, `<APP>_DYNCONFURL`, `<APP>_LOCALCONFFILE`,
/// `<APP>_STATEFILE` and `<APP>_DEVMODE` from the process environment.
pub fn apply_env_overrides(settings: ConfSettings) -> ConfSettings {
    apply_overrides_from(settings, |key| std::env::var(key).ok())
}

/// Same as [`apply_env_overrides`] with an explicit variable lookup.
pub fn apply_overrides_from<F>(mut settings: ConfSettings, lookup: F) -> ConfSettings
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = env_prefix(&settings.app_name);
    let var = |name: &str| {
        let key = format!("{}_{}", prefix, name);
        let value = lookup(&key);
        if value.is_some() {
            tracing::debug!(var = %key, "Applying environment override");
        }
        value
    };

    if let Some(v) = var("CONFPATH") {
        settings.conf_dir = v;
    }
    if let Some(v) = var("DYNCONFURL") {
        settings.dyn_conf_url = Some(v);
    }
    if let Some(v) = var("LOCALCONFFILE") {
        settings.local_conf_file = Some(v);
    }
    if let Some(v) = var("STATEFILE") {
        settings.state_file = Some(v);
    }
    if let Some(v) = var("DEVMODE") {
        let v = v.trim();
        settings.dev_mode = v == "1" || v.eq_ignore_ascii_case("true");
    }

    settings
}
