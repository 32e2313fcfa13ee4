//! Persistence helpers.
//!
//! # Design Decisions
//! - Never truncate the live file in place; stage next to it and rename
//! - The previous version stays recoverable until the new one is in place

pub mod atomic;

pub use atomic::{recover_interrupted, write_atomic, AtomicWrite};
