//! Error taxonomy for coordinate loads.

use crate::cache::CacheError;
use crate::fetch::FetchError;
use crate::inject::InjectionError;
use crate::lifecycle::{LoadState, TransitionError};
use crate::relocate::RelocationError;
use crate::resolver::ResolveError;
use loadstone_common::error::ModelError;
use std::fmt;
use std::time::Duration;

/// Classification of a failed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// The coordinate could not be built or resolved to any URL.
    MalformedCoordinate,
    /// No repository served the artifact.
    UnreachableRepository,
    /// Downloaded bytes failed verification.
    IntegrityMismatch,
    /// Downloaded bytes are not a valid archive.
    CorruptArtifact,
    /// Namespace relocation failed.
    RelocationFailure,
    /// The host refused the artifact.
    InjectionRejected,
    /// The coordinate's time budget ran out.
    Timeout,
    /// The cache directory could not be used.
    CacheUnavailable,
    /// The orchestrator requested an illegal state transition.
    Internal,
}

impl ErrorKind {
    /// Stable `snake_case` label used in logs and summaries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MalformedCoordinate => "malformed_coordinate",
            Self::UnreachableRepository => "unreachable_repository",
            Self::IntegrityMismatch => "integrity_mismatch",
            Self::CorruptArtifact => "corrupt_artifact",
            Self::RelocationFailure => "relocation_failure",
            Self::InjectionRejected => "injection_rejected",
            Self::Timeout => "timeout",
            Self::CacheUnavailable => "cache_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why one coordinate failed to load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The coordinate description was invalid.
    #[error("malformed coordinate: {0}")]
    Malformed(#[from] ModelError),

    /// The coordinate has nowhere to be fetched from.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Fetching failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Relocation failed.
    #[error("relocation failed: {0}")]
    Relocation(#[from] RelocationError),

    /// Injection failed.
    #[error("injection failed: {0}")]
    Injection(#[from] InjectionError),

    /// The time budget expired before `state` could start.
    #[error("timed out after {elapsed:?} before {state}")]
    Timeout {
        /// State that was about to be entered.
        state: LoadState,
        /// Time spent on the coordinate.
        elapsed: Duration,
    },

    /// The cache failed outside fetching.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The orchestrator broke the lifecycle rules.
    #[error(transparent)]
    Lifecycle(#[from] TransitionError),
}

impl LoadError {
    /// Classify the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) | Self::Resolve(_) => ErrorKind::MalformedCoordinate,
            Self::Fetch(err) => err.kind(),
            Self::Relocation(_) => ErrorKind::RelocationFailure,
            Self::Injection(_) => ErrorKind::InjectionRejected,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cache(_) => ErrorKind::CacheUnavailable,
            Self::Lifecycle(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias using [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
