//! Loadstone loads pinned JAR artifacts into a running host at runtime.
//!
//! This crate is the entry point for embedders. It owns the TOML engine
//! configuration ([`SharedConfig`]) and re-exports the pieces needed to
//! describe coordinates and drive a [`Pipeline`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use camino::Utf8Path;
//! use loadstone::{ClassPathHost, Coordinate, Repository, SharedConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SharedConfig::load_from(Utf8Path::new("loadstone.toml"))?;
//! let host = Arc::new(ClassPathHost::new());
//! let pipeline = config.build_pipeline(host.clone())?;
//!
//! let coordinate = Coordinate::builder()
//!     .group("com.google.code.gson")
//!     .artifact("gson")
//!     .version("2.11.0")
//!     .repository(Repository::maven_central())
//!     .relocate("com.google.gson", "org.example.shaded.gson")
//!     .build()?;
//! let result = pipeline.load(&coordinate);
//! assert!(result.is_loaded());
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use config::{ConfigError, EvictionConfig, RepositoryConfig, SharedConfig, VerificationConfig};
pub use loadstone_common::coordinate::{Coordinate, CoordinateDescriptor};
pub use loadstone_common::digest::IntegrityDescriptor;
pub use loadstone_common::repository::Repository;
pub use loadstone_loader::{
    BatchSummary, ClassPathHost, ErrorKind, HostInjector, Injection, InjectionError, LoadError,
    LoadResult, LoadState, LoadedArtifact, Pipeline, PipelineConfig,
};
