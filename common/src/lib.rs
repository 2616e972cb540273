//! Shared model types for the loadstone dependency loader.
//!
//! These types describe *what* to load: artifact coordinates, the
//! repositories that serve them, the relocation rules applied to them, and
//! the digests that vouch for them. They carry no I/O and are reused by the
//! loader engine and by configuration parsing.
//!
//! # Modules
//!
//! - [`coordinate`] - Artifact coordinates and their builder
//! - [`digest`] - Content digests and integrity descriptors
//! - [`error`] - Validation errors
//! - [`relocation`] - Relocation rules, rule sets and fingerprints
//! - [`repository`] - Remote repository base URLs

pub mod coordinate;
pub mod digest;
pub mod error;
pub mod relocation;
pub mod repository;

pub use coordinate::{Coordinate, CoordinateBuilder, CoordinateDescriptor};
pub use digest::{DigestAlgorithm, IntegrityDescriptor, Sha256Digest};
pub use error::ModelError;
pub use relocation::{RelocationRule, RelocationSet, RuleFingerprint};
pub use repository::Repository;
