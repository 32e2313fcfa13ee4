//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (LiveConf::load):
//!     Local → State (+ saver task) → Dynamic (blocks until first success)
//!
//! Shutdown (shutdown.rs):
//!     trigger → every background loop leaves its sleep → final state flush
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Background loops are one task each, never respawned per cycle
//! - A signal observed late still sees the shutdown (level, not edge)

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
