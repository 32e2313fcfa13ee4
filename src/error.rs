//! Error definitions shared by the loaders, the state saver and the facade.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::validation::ValidationError;

/// Errors returned by the content fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The location is one of the disable sentinels.
    #[error("location is disabled")]
    Disabled,

    /// The HTTP request could not be completed (connect, TLS, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading a local file failed; `status` is the HTTP-like code it maps to.
    #[error("failed to read {} (status {status}): {source}", .path.display())]
    Read {
        path: PathBuf,
        status: u16,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Status code paired with the error: 0 for transport failures,
    /// 404/403/500 for local reads.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Disabled | FetchError::Http(_) => 0,
            FetchError::Read { status, .. } => *status,
        }
    }
}

/// Errors produced while loading a source into a snapshot or document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },

    #[error("got status code {status} while loading {location}")]
    BadStatus { location: String, status: u16 },

    #[error("failed to parse {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{location} does not contain a JSON object")]
    NotAnObject { location: String },
}

/// Errors raised while writing the state document to disk.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write state file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the facade's load step.
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("invalid settings: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] FetchError),

    #[error("failed to load local configuration: {0}")]
    Local(#[source] LoadError),
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
