//! Self-updating loaders.
//!
//! # Data Flow
//! ```text
//! PollingLoader (polling.rs)
//!     fetch → compare with byte snapshot → swap → handler(old, new)
//!
//! JsonPollingLoader (json.rs)
//!     byte handler → parse → swap document → handler(old doc, new doc)
//!     parse failure → warn, keep previous document
//! ```
//!
//! # Design Decisions
//! - Change detection is a full byte comparison, not a hash
//! - One handler per loader, fixed at construction
//! - Snapshots live in `ArcSwap`, so readers never wait on a fetch

pub mod json;
pub mod polling;

pub use json::{JsonPollingLoader, JsonUpdateHandler};
pub use polling::{PollingLoader, UpdateHandler};
