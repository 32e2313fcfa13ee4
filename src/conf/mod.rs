//! Configuration facade.
//!
//! # Data Flow
//! ```text
//! LiveConf::load(settings)
//!     → Local:   fetch + parse once            (error aborts the load)
//!     → State:   read state file or {}          (never aborts)
//!                → saver task: serialize → write_atomic → sleep → ...
//!     → Dynamic: JsonPollingLoader::start       (retries until first success)
//!                → poll task: fetch → diff → parse → handler(conf, previous)
//! ```
//!
//! # Design Decisions
//! - Updates are whole-document swaps; there is no merging
//! - Local and Dynamic are read-only `Arc<Value>` views
//! - State locks per call, so multi-key changes are not atomic
//! - Writes to the state file are serialized through one `StateFile`

pub mod facade;
pub mod state;

pub use facade::{DynUpdateHandler, LiveConf};
pub use state::{SharedState, StateFile};
