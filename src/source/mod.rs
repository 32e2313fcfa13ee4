//! Source locations and content fetching.
//!
//! # Data Flow
//! ```text
//! location string
//!     → location.rs (http(s) URL | filesystem path | disabled)
//!     → fetcher.rs (GET with timeout, or whole-file read)
//!     → Fetched { status, body } or FetchError
//! ```
//!
//! # Design Decisions
//! - No retries here; retry policy belongs to the polling loader
//! - File read errors are mapped onto HTTP-like status codes (404/403/500)
//! - TLS certificates are not verified

pub mod fetcher;
pub mod location;

pub use fetcher::{ContentFetcher, Fetched};
pub use location::SourceLocation;
