//! Uniform byte retrieval from HTTP(S) endpoints and local files.

use bytes::Bytes;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::error::FetchError;
use crate::observability::metrics;
use crate::source::location::SourceLocation;

/// A completed fetch. A non-200 HTTP response is still a `Fetched`.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub body: Bytes,
}

impl Fetched {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Body as text, lossy on invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Fetches raw bytes from a [`SourceLocation`].
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
}

impl ContentFetcher {
    /// Build a fetcher. Certificate validation is switched off and system
    /// proxies are ignored.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `location` once. `timeout` bounds the whole HTTP exchange; file
    /// reads are not bounded.
    pub async fn fetch(
        &self,
        location: &SourceLocation,
        timeout: Duration,
    ) -> Result<Fetched, FetchError> {
        let result = match location {
            SourceLocation::Disabled => Err(FetchError::Disabled),
            SourceLocation::Http(url) => self.fetch_http(url, timeout).await,
            SourceLocation::File(path) => fetch_file(path).await,
        };

        let outcome = match &result {
            Ok(fetched) if fetched.is_ok() => "ok",
            Ok(_) => "bad_status",
            Err(_) => "error",
        };
        metrics::record_fetch(location.kind(), outcome);

        result
    }

    async fn fetch_http(&self, url: &str, timeout: Duration) -> Result<Fetched, FetchError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(Fetched { status, body })
    }
}

async fn fetch_file(path: &Path) -> Result<Fetched, FetchError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Fetched {
            status: 200,
            body: Bytes::from(data),
        }),
        Err(e) => Err(FetchError::Read {
            path: path.to_path_buf(),
            status: status_for_io_error(e.kind()),
            source: e,
        }),
    }
}

fn status_for_io_error(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::NotFound => 404,
        ErrorKind::PermissionDenied => 403,
        _ => 500,
    }
}
