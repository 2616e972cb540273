//! The `entry.json` sidecar recorded beside every cached archive.

use loadstone_common::digest::Sha256Digest;
use serde::{Deserialize, Serialize};

/// File name of the sidecar inside an entry directory.
pub const SIDECAR_FILE: &str = "entry.json";

/// The sidecar schema version this build writes and reads.
pub const SIDECAR_SCHEMA_VERSION: u32 = 1;

/// Metadata describing one complete cache entry.
///
/// The sidecar's existence marks the entry as complete; its `sha256` is the
/// hash every cache hit is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySidecar {
    schema_version: u32,
    coordinate: String,
    fingerprint: String,
    file_name: String,
    sha256: Sha256Digest,
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_sha256: Option<Sha256Digest>,
}

impl EntrySidecar {
    /// Describe an archive about to be committed.
    #[must_use]
    pub fn new(
        coordinate: &str,
        fingerprint: &str,
        file_name: &str,
        sha256: Sha256Digest,
        size: u64,
        source_sha256: Option<Sha256Digest>,
    ) -> Self {
        Self {
            schema_version: SIDECAR_SCHEMA_VERSION,
            coordinate: coordinate.to_owned(),
            fingerprint: fingerprint.to_owned(),
            file_name: file_name.to_owned(),
            sha256,
            size,
            source_sha256,
        }
    }

    /// Parse a sidecar.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed or unknown-field documents.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Render the sidecar as pretty JSON.
    ///
    /// # Errors
    ///
    /// Propagates serialisation failures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Return true when this build understands the sidecar.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.schema_version == SIDECAR_SCHEMA_VERSION
    }

    /// Coordinate label the entry was created for.
    #[must_use]
    pub fn coordinate(&self) -> &str {
        &self.coordinate
    }

    /// Content hash of the archive.
    #[must_use]
    pub fn sha256(&self) -> &Sha256Digest {
        &self.sha256
    }

    /// Archive size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// For relocated entries, the hash of the raw archive they were built
    /// from.
    #[must_use]
    pub fn source_sha256(&self) -> Option<&Sha256Digest> {
        self.source_sha256.as_ref()
    }
}
