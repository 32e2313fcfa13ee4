//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! fetcher / loaders / state saver produce:
//!     → tracing events (structured, with location/path fields)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Library code only emits; the binary decides where events go
//! - Counters are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
