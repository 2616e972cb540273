//! Handing finished artifacts to the host's search path.

use crate::fetch::archive::{self, ArchiveError};
use log::{debug, info};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Errors reported by injection.
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// The artifact file does not exist.
    #[error("artifact {path} does not exist")]
    MissingArtifact {
        /// Path that was offered for injection.
        path: PathBuf,
    },

    /// The host refused the artifact.
    #[error("host rejected {path}: {reason}")]
    Rejected {
        /// Path that was offered for injection.
        path: PathBuf,
        /// Host-supplied reason.
        reason: String,
    },
}

/// The host's capability to extend its class search path.
#[cfg_attr(test, mockall::automock)]
pub trait HostInjector: Send + Sync {
    /// Append `path` to the search path.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::Rejected`] when the host refuses the path.
    fn append_to_search_path(&self, path: &Path) -> Result<(), InjectionError>;
}

/// Outcome of a successful injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// The host accepted the path.
    Appended,
    /// The path was injected earlier; the host was not called again.
    AlreadyPresent,
}

/// Idempotent front-end over a [`HostInjector`].
pub struct Injector {
    host: Arc<dyn HostInjector>,
    injected: Mutex<HashSet<PathBuf>>,
}

impl Injector {
    /// Wrap `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostInjector>) -> Self {
        Self {
            host,
            injected: Mutex::new(HashSet::new()),
        }
    }

    /// Inject `path` unless it already was.
    ///
    /// The registry lock is held across the host call so concurrent
    /// requests for one path reach the host once.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError`] when the file is missing or the host
    /// refuses it. A failed injection is not recorded.
    pub fn inject(&self, path: &Path) -> Result<Injection, InjectionError> {
        let mut injected = self
            .injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if injected.contains(path) {
            debug!(target: "loadstone::inject", "{} already on the search path", path.display());
            return Ok(Injection::AlreadyPresent);
        }
        if !path.is_file() {
            return Err(InjectionError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        self.host.append_to_search_path(path)?;
        injected.insert(path.to_path_buf());
        info!(target: "loadstone::inject", "appended {} to the search path", path.display());
        Ok(Injection::Appended)
    }

    /// Whether `path` has been injected through this injector.
    #[must_use]
    pub fn is_injected(&self, path: &Path) -> bool {
        self.injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    /// Every path injected through this injector, sorted.
    #[must_use]
    pub fn injected_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector").finish_non_exhaustive()
    }
}

/// In-process host that keeps an ordered search path.
///
/// Useful for embedding hosts that launch a JVM with an explicit class path,
/// and for tests.
#[derive(Debug, Default)]
pub struct ClassPathHost {
    entries: Mutex<Vec<PathBuf>>,
}

impl ClassPathHost {
    /// An empty search path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The search path, in injection order.
    #[must_use]
    pub fn entries(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The search path joined with the platform separator.
    ///
    /// # Errors
    ///
    /// Returns [`std::env::JoinPathsError`] if an entry contains the
    /// separator.
    pub fn class_path(&self) -> Result<OsString, std::env::JoinPathsError> {
        std::env::join_paths(self.entries())
    }

    /// Class names under `package_prefix` across every injected archive,
    /// sorted and without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if an injected archive cannot be read.
    pub fn search_units(&self, package_prefix: &str) -> Result<Vec<String>, ArchiveError> {
        let mut units = Vec::new();
        for entry in self.entries() {
            units.extend(archive::list_units(&entry, package_prefix)?);
        }
        units.sort();
        units.dedup();
        Ok(units)
    }
}

impl HostInjector for ClassPathHost {
    fn append_to_search_path(&self, path: &Path) -> Result<(), InjectionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.iter().any(|entry| entry == path) {
            entries.push(path.to_path_buf());
        }
        Ok(())
    }
}
