//! Loadstone loader library.
//!
//! Loads pinned JAR artifacts into a running host: each coordinate is
//! resolved against Maven-layout repositories, fetched through an on-disk
//! cache, verified, optionally relocated into a private namespace, and
//! handed to the host's search path.
//!
//! # Modules
//!
//! - [`cache`] - Content-verified on-disk artifact cache and eviction
//! - [`dirs`] - Default cache directory resolution
//! - [`error`] - Error kinds and the per-coordinate load error
//! - [`fetch`] - Downloading, verification and archive validation
//! - [`inject`] - Idempotent hand-off to the host search path
//! - [`lifecycle`] - Per-coordinate state machine and deadlines
//! - [`pipeline`] - Batch orchestration over a bounded worker pool
//! - [`relocate`] - Namespace relocation of archives and class files
//! - [`resolver`] - Candidate URL construction
//! - [`summary`] - Batch outcome counts

pub mod cache;
pub mod dirs;
pub mod error;
pub mod fetch;
pub mod inject;
pub mod lifecycle;
pub mod pipeline;
pub mod relocate;
pub mod resolver;
pub mod summary;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use error::{ErrorKind, LoadError};
pub use inject::{ClassPathHost, HostInjector, Injection, InjectionError};
pub use lifecycle::LoadState;
pub use pipeline::{LoadResult, LoadedArtifact, Pipeline, PipelineConfig};
pub use summary::BatchSummary;
