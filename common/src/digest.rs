//! Content digests and integrity descriptors.
//!
//! [`Sha256Digest`] is the canonical content hash recorded for every cached
//! artifact. [`IntegrityDescriptor`] is the caller's (or the repository's)
//! statement of what a raw artifact must hash to.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// A validated hex-encoded SHA-256 digest string.
///
/// # Examples
///
/// ```
/// use loadstone_common::digest::Sha256Digest;
///
/// let digest = Sha256Digest::of(b"hello");
/// assert_eq!(digest.as_str().len(), 64);
/// assert_eq!(Sha256Digest::try_from(digest.as_str()), Ok(digest));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hash `bytes` and return the lowercase hex digest.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(DigestAlgorithm::Sha256.hex_digest(bytes))
    }

    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the first `len` hex characters, used for short path segments.
    #[must_use]
    pub fn short(&self, len: usize) -> &str {
        self.0.get(..len).unwrap_or(&self.0)
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self> {
        validate_hex(value, DigestAlgorithm::Sha256)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        validate_hex(&value, DigestAlgorithm::Sha256)?;
        Ok(Self(value))
    }
}

impl From<Sha256Digest> for String {
    fn from(value: Sha256Digest) -> Self {
        value.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash algorithms accepted in an [`IntegrityDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256, 64 hex characters.
    Sha256,
    /// SHA-512, 128 hex characters.
    Sha512,
}

impl DigestAlgorithm {
    /// Every supported algorithm, strongest first.
    pub const ALL: [Self; 2] = [Self::Sha512, Self::Sha256];

    /// Expected length of a hex-encoded digest.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Label used in descriptor strings and repository checksum file
    /// extensions (`foo.jar.sha256`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Hash `bytes` and return the lowercase hex digest.
    #[must_use]
    pub fn hex_digest(self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            Self::Sha512 => format!("{:x}", Sha512::digest(bytes)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            other => Err(ModelError::InvalidDigest {
                reason: format!("unsupported algorithm \"{other}\""),
            }),
        }
    }
}

/// The expected digest of a raw artifact.
///
/// Descriptors are written `<algorithm>:<hex>`. Hex input is normalised to
/// lowercase.
///
/// # Examples
///
/// ```
/// use loadstone_common::digest::IntegrityDescriptor;
///
/// let hex = loadstone_common::digest::Sha256Digest::of(b"jar bytes");
/// let descriptor: IntegrityDescriptor = format!("sha256:{hex}").parse().unwrap();
/// assert!(descriptor.verify(b"jar bytes").is_ok());
/// assert!(descriptor.verify(b"tampered").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IntegrityDescriptor {
    algorithm: DigestAlgorithm,
    expected: String,
}

/// A digest comparison failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{algorithm} mismatch: expected {expected}, got {actual}")]
pub struct IntegrityMismatch {
    /// Algorithm used for the comparison.
    pub algorithm: DigestAlgorithm,
    /// Digest the descriptor promised.
    pub expected: String,
    /// Digest of the bytes actually received.
    pub actual: String,
}

impl IntegrityDescriptor {
    /// Build a descriptor from an algorithm and a hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidDigest`] if `hex` has the wrong length or
    /// contains non-hex characters.
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> Result<Self> {
        let expected = hex.trim().to_ascii_lowercase();
        validate_hex(&expected, algorithm)?;
        Ok(Self {
            algorithm,
            expected,
        })
    }

    /// Build a SHA-256 descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidDigest`] for malformed hex.
    pub fn sha256(hex: &str) -> Result<Self> {
        Self::new(DigestAlgorithm::Sha256, hex)
    }

    /// Parse the body of a repository checksum file.
    ///
    /// Repositories publish either the bare digest or the digest followed by
    /// whitespace and a file name; only the first token is used.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidDigest`] when the first token is not a
    /// valid digest for `algorithm`.
    pub fn from_checksum_file(algorithm: DigestAlgorithm, body: &str) -> Result<Self> {
        let token = body
            .split_whitespace()
            .next()
            .ok_or_else(|| ModelError::InvalidDigest {
                reason: "checksum file is empty".to_owned(),
            })?;
        Self::new(algorithm, token)
    }

    /// Return the algorithm.
    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Return the expected lowercase hex digest.
    #[must_use]
    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Check `bytes` against the expected digest.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityMismatch`] carrying both digests when they differ.
    pub fn verify(&self, bytes: &[u8]) -> std::result::Result<(), IntegrityMismatch> {
        let actual = self.algorithm.hex_digest(bytes);
        if actual == self.expected {
            return Ok(());
        }
        Err(IntegrityMismatch {
            algorithm: self.algorithm,
            expected: self.expected.clone(),
            actual,
        })
    }

    /// Compare against a known SHA-256 content hash without rehashing.
    ///
    /// Returns `None` when the descriptor uses another algorithm.
    #[must_use]
    pub fn matches_sha256(&self, digest: &Sha256Digest) -> Option<bool> {
        match self.algorithm {
            DigestAlgorithm::Sha256 => Some(self.expected == digest.as_str()),
            DigestAlgorithm::Sha512 => None,
        }
    }
}

impl FromStr for IntegrityDescriptor {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self> {
        let (algorithm, hex) = value
            .split_once(':')
            .ok_or_else(|| ModelError::InvalidDigest {
                reason: format!("expected `<algorithm>:<hex>`, got \"{value}\""),
            })?;
        Self::new(algorithm.parse()?, hex)
    }
}

impl TryFrom<String> for IntegrityDescriptor {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IntegrityDescriptor> for String {
    fn from(value: IntegrityDescriptor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for IntegrityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.expected)
    }
}

fn validate_hex(value: &str, algorithm: DigestAlgorithm) -> Result<()> {
    let expected_len = algorithm.hex_len();
    if value.len() != expected_len {
        return Err(ModelError::InvalidDigest {
            reason: format!(
                "expected {expected_len} hex characters for {algorithm}, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ModelError::InvalidDigest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ModelError::InvalidDigest {
            reason: "digest must be lowercase".to_owned(),
        });
    }
    Ok(())
}
