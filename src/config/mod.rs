//! Settings for the configuration subsystem itself.
//!
//! # Data Flow
//! ```text
//! settings file (TOML) or ConfSettings literal
//!     → loader.rs (parse & deserialize)
//!     → apply_env_overrides (<APP>_CONFPATH, _DYNCONFURL, _LOCALCONFFILE,
//!       _STATEFILE, _DEVMODE)
//!     → validation.rs (semantic checks)
//!     → ConfSettings::resolve (defaults, sentinels, locations)
//!     → ResolvedSettings consumed by LiveConf::load
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal settings files
//! - Defaults are resolved once, before any tier is loaded
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, apply_overrides_from, env_prefix, load_settings, SettingsError};
pub use schema::{ConfSettings, ResolvedSettings};
pub use validation::{validate_settings, ValidationError};
