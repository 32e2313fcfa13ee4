//! Self-updating configuration for long-running services.
//!
//! Three tiers behind one facade: Local (read once), Dynamic (polled and
//! diffed in the background) and State (mutable, flushed to disk atomically).

pub mod autoload;
pub mod conf;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod persist;
pub mod source;

pub use conf::{LiveConf, SharedState};
pub use config::ConfSettings;
pub use error::{ConfError, FetchError, LoadError, PersistError};
pub use lifecycle::Shutdown;
