//! Cache-first retrieval of verified artifacts.
//!
//! The [`Fetcher`] answers from the cache when it can and otherwise walks
//! the resolver's candidates in order. A downloaded body only reaches the
//! cache once it has passed integrity verification and archive validation.

pub mod archive;
pub mod download;
pub mod verification;

use crate::cache::{CacheError, CacheKey, CacheStore, CachedArtifact, EntryCheck};
use crate::error::ErrorKind;
use crate::lifecycle::Deadline;
use crate::resolver::Candidate;
use archive::ArchiveError;
use download::{ArtifactDownloader, DownloadError};
use loadstone_common::coordinate::Coordinate;
use loadstone_common::digest::{DigestAlgorithm, IntegrityDescriptor, IntegrityMismatch};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use verification::VerificationPolicy;

/// Why a single candidate URL was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AttemptFailure {
    /// The download itself failed.
    #[error(transparent)]
    Download(DownloadError),

    /// The body did not match its integrity descriptor.
    #[error(transparent)]
    Integrity(IntegrityMismatch),

    /// Integrity evidence is required and none was available.
    #[error("no integrity descriptor available")]
    MissingIntegrity,

    /// The body is not a valid archive.
    #[error(transparent)]
    Corrupt(ArchiveError),
}

impl AttemptFailure {
    fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_) | Self::MissingIntegrity)
    }
}

/// One rejected candidate.
#[derive(Debug)]
pub struct Attempt {
    /// Candidate URL.
    pub url: String,
    /// Why it was rejected.
    pub failure: AttemptFailure,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.failure)
    }
}

fn describe(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no candidates tried".to_owned();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned when no candidate produced an acceptable artifact.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// At least one candidate failed verification.
    #[error("integrity check failed for {coordinate} ({})", describe(.attempts))]
    IntegrityMismatch {
        /// Coordinate label.
        coordinate: String,
        /// Every rejected candidate.
        attempts: Vec<Attempt>,
    },

    /// No candidate failed verification, but at least one served an
    /// invalid archive.
    #[error("corrupt artifact for {coordinate} ({})", describe(.attempts))]
    CorruptArtifact {
        /// Coordinate label.
        coordinate: String,
        /// Every rejected candidate.
        attempts: Vec<Attempt>,
    },

    /// Every candidate failed to download.
    #[error("no repository served {coordinate} ({})", describe(.attempts))]
    Unreachable {
        /// Coordinate label.
        coordinate: String,
        /// Every rejected candidate.
        attempts: Vec<Attempt>,
    },

    /// The coordinate's time budget ran out.
    #[error("timed out fetching {coordinate} ({})", describe(.attempts))]
    TimedOut {
        /// Coordinate label.
        coordinate: String,
        /// Candidates rejected before the deadline.
        attempts: Vec<Attempt>,
    },

    /// The cache could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl FetchError {
    /// Classify the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::CorruptArtifact { .. } => ErrorKind::CorruptArtifact,
            Self::Unreachable { .. } => ErrorKind::UnreachableRepository,
            Self::TimedOut { .. } => ErrorKind::Timeout,
            Self::Cache(_) => ErrorKind::CacheUnavailable,
        }
    }

    /// The per-candidate failures, empty for cache errors.
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::IntegrityMismatch { attempts, .. }
            | Self::CorruptArtifact { attempts, .. }
            | Self::Unreachable { attempts, .. }
            | Self::TimedOut { attempts, .. } => attempts,
            Self::Cache(_) => &[],
        }
    }

    fn from_attempts(coordinate: String, attempts: Vec<Attempt>, expired: bool) -> Self {
        if attempts.iter().any(|attempt| attempt.failure.is_integrity()) {
            Self::IntegrityMismatch {
                coordinate,
                attempts,
            }
        } else if attempts
            .iter()
            .any(|attempt| matches!(attempt.failure, AttemptFailure::Corrupt(_)))
        {
            Self::CorruptArtifact {
                coordinate,
                attempts,
            }
        } else if expired {
            Self::TimedOut {
                coordinate,
                attempts,
            }
        } else {
            Self::Unreachable {
                coordinate,
                attempts,
            }
        }
    }
}

/// A verified raw artifact, cached on disk.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    /// The cache entry.
    pub artifact: CachedArtifact,
    /// Whether the entry existed before this fetch.
    pub from_cache: bool,
    /// URL the bytes came from, when downloaded.
    pub source_url: Option<String>,
}

/// Retrieves raw artifacts through the cache.
pub struct Fetcher {
    downloader: Box<dyn ArtifactDownloader>,
    cache: Arc<CacheStore>,
    policy: VerificationPolicy,
    request_timeout: Duration,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("cache", &self.cache.root())
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(
        downloader: Box<dyn ArtifactDownloader>,
        cache: Arc<CacheStore>,
        policy: VerificationPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            downloader,
            cache,
            policy,
            request_timeout,
        }
    }

    /// The cache this fetcher writes to.
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Return the verified raw artifact for `coordinate`.
    ///
    /// A valid cache entry is returned without touching the network.
    /// Otherwise `candidates` are tried in order and the first body that
    /// verifies and validates is cached and returned.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when no candidate is acceptable, the deadline
    /// expires, or the cache fails.
    pub fn fetch(
        &self,
        coordinate: &Coordinate,
        candidates: &[Candidate],
        deadline: &Deadline,
    ) -> Result<FetchedArtifact, FetchError> {
        let key = CacheKey::raw(coordinate);
        let label = coordinate.to_string();
        let check = EntryCheck::Raw {
            integrity: coordinate.integrity(),
        };
        if let Some(artifact) = self.cache.lookup(&key, check)? {
            debug!(target: "loadstone::fetch", "{label}: cache hit at {}", artifact.path());
            return Ok(FetchedArtifact {
                artifact,
                from_cache: true,
                source_url: None,
            });
        }

        let mut attempts = Vec::new();
        for candidate in candidates {
            let Some(timeout) = deadline.clamp(self.request_timeout) else {
                return Err(FetchError::TimedOut {
                    coordinate: label,
                    attempts,
                });
            };
            debug!(target: "loadstone::fetch", "{label}: trying {}", candidate.url());
            match self.try_candidate(coordinate, candidate, timeout, deadline) {
                Ok(bytes) => {
                    let artifact = self.cache.store(&key, &bytes, &label, None)?;
                    info!(
                        target: "loadstone::fetch",
                        "{label}: downloaded {} bytes from {}",
                        artifact.size(),
                        candidate.url()
                    );
                    return Ok(FetchedArtifact {
                        artifact,
                        from_cache: false,
                        source_url: Some(candidate.url().to_owned()),
                    });
                }
                Err(failure) => {
                    warn!(
                        target: "loadstone::fetch",
                        "{label}: skipping {}: {failure}",
                        candidate.url()
                    );
                    attempts.push(Attempt {
                        url: candidate.url().to_owned(),
                        failure,
                    });
                }
            }
        }
        Err(FetchError::from_attempts(
            label,
            attempts,
            deadline.is_expired(),
        ))
    }

    fn try_candidate(
        &self,
        coordinate: &Coordinate,
        candidate: &Candidate,
        timeout: Duration,
        deadline: &Deadline,
    ) -> Result<Vec<u8>, AttemptFailure> {
        let bytes = self
            .downloader
            .fetch_bytes(candidate.url(), timeout)
            .map_err(AttemptFailure::Download)?;

        let descriptor = match coordinate.integrity() {
            Some(descriptor) => Some(descriptor.clone()),
            None if self.policy.fetch_remote_checksums() => {
                self.published_checksum(candidate, deadline)
            }
            None => None,
        };
        match descriptor {
            Some(descriptor) => descriptor
                .verify(&bytes)
                .map_err(AttemptFailure::Integrity)?,
            None if self.policy.require_integrity() => {
                return Err(AttemptFailure::MissingIntegrity);
            }
            None => {
                warn!(
                    target: "loadstone::fetch",
                    "{coordinate}: accepting {} without integrity evidence",
                    candidate.url()
                );
            }
        }

        archive::validate_archive(&bytes).map_err(AttemptFailure::Corrupt)?;
        Ok(bytes)
    }

    /// The strongest checksum the repository publishes next to the
    /// artifact, if any can be fetched and parsed.
    fn published_checksum(
        &self,
        candidate: &Candidate,
        deadline: &Deadline,
    ) -> Option<IntegrityDescriptor> {
        for algorithm in DigestAlgorithm::ALL {
            let timeout = deadline.clamp(self.request_timeout)?;
            let url = candidate.checksum_url(algorithm);
            match self.downloader.fetch_text(&url, timeout) {
                Ok(body) => match IntegrityDescriptor::from_checksum_file(algorithm, &body) {
                    Ok(descriptor) => return Some(descriptor),
                    Err(err) => debug!(target: "loadstone::fetch", "ignoring {url}: {err}"),
                },
                Err(err) => debug!(target: "loadstone::fetch", "no checksum at {url}: {err}"),
            }
        }
        None
    }
}
