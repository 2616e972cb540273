//! HTTP retrieval of artifacts and checksum files.
//!
//! Provides a trait-based abstraction over repository downloads so the
//! fetcher can be exercised without network access.

use std::io::Read;
use std::time::Duration;

/// Default network timeout applied when a request supplies none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for downloading files from a remote repository.
///
/// Implementations must be shareable between the pipeline's workers.
///
/// # Examples
///
/// ```
/// use loadstone_loader::fetch::download::HttpDownloader;
///
/// let downloader = HttpDownloader::default();
/// // Use downloader.fetch_bytes(url, timeout) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactDownloader: Send + Sync {
    /// Download `url` and return the full body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, answers with a
    /// non-success status, or the body cannot be read completely.
    fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, DownloadError>;

    /// Download `url` and return the body as text.
    ///
    /// # Errors
    ///
    /// As [`fetch_bytes`](Self::fetch_bytes), plus non-UTF-8 bodies.
    fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, DownloadError>;
}

/// Errors arising from repository downloads.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested file was not found (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The request did not complete within its timeout.
    #[error("timed out fetching {url}")]
    TimedOut {
        /// The URL that was requested.
        url: String,
    },

    /// I/O error reading the response body.
    #[error("I/O error reading {url}: {source}")]
    Io {
        /// The URL that was requested.
        url: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// HTTP-based downloader using `ureq`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    /// Create a downloader whose requests default to `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<ureq::http::Response<ureq::Body>, DownloadError> {
        self.agent
            .get(url)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .call()
            .map_err(|e| map_ureq_error(url, &e))
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl ArtifactDownloader for HttpDownloader {
    fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, DownloadError> {
        let response = self.get(url, timeout)?;
        let mut bytes = Vec::new();
        response
            .into_body()
            .as_reader()
            .read_to_end(&mut bytes)
            .map_err(|source| DownloadError::Io {
                url: url.to_owned(),
                source,
            })?;
        Ok(bytes)
    }

    fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, DownloadError> {
        let response = self.get(url, timeout)?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| map_ureq_error(url, &e))
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::Timeout(_) => DownloadError::TimedOut {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
