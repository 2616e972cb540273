//! On-disk artifact cache.
//!
//! Entries are addressed by [`CacheKey`] and laid out as
//! `<root>/<group>/<artifact>/<version>/<classifier|default>-<raw|relocated-<fp>>/`.
//! Each entry directory holds the archive, an `entry.json` sidecar and a
//! `last-used` stamp. Entries are created by atomic rename and only ever
//! removed wholesale; the sidecar is written last and marks completion.

pub mod eviction;
pub mod key;
pub mod sidecar;
pub mod store;

pub use eviction::{EvictionPolicy, EvictionReport};
pub use key::CacheKey;
pub use store::{CacheStore, CachedArtifact, EntryCheck};

use camino::Utf8PathBuf;

/// Errors that prevent the cache from being read or written.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache root could not be created.
    #[error("cache directory {path} is unavailable: {source}")]
    Unavailable {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Acquiring an entry lock failed.
    #[error("failed to lock cache entry {path}: {source}")]
    Lock {
        /// Lock file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a cache file failed.
    #[error("failed to read cache file {path}: {source}")]
    Read {
        /// File or directory path that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a cache file failed.
    #[error("failed to write cache file {path}: {source}")]
    Write {
        /// File path that could not be written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serialising a sidecar failed.
    #[error("failed to serialise cache sidecar: {source}")]
    Serialize {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// Removing an entry failed.
    #[error("failed to evict cache entry {path}: {source}")]
    Evict {
        /// Entry directory that could not be removed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
