//! Settings validation.
//!
//! # Responsibilities
//! - Semantic checks that serde cannot express
//! - Report every problem, not just the first
//!
//! Runs before any tier is loaded.

use thiserror::Error;

use crate::config::schema::ConfSettings;
use crate::source::location::{is_disabled, SourceLocation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// State must be written back, which only works for local paths.
    #[error("state file must be a local path, got {0}")]
    StateFileIsRemote(String),

    #[error("conf_dir is empty but a default file path depends on it")]
    EmptyConfDir,

    #[error("app_name must not be empty")]
    EmptyAppName,
}

/// Check `settings`, collecting every error.
pub fn validate_settings(settings: &ConfSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(raw) = settings.state_file.as_deref() {
        if !is_disabled(raw) && SourceLocation::parse(raw).is_remote() {
            errors.push(ValidationError::StateFileIsRemote(raw.to_string()));
        }
    }

    if settings.conf_dir.trim().is_empty() && settings.uses_conf_dir() {
        errors.push(ValidationError::EmptyConfDir);
    }

    if settings.app_name.trim().is_empty() {
        errors.push(ValidationError::EmptyAppName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
