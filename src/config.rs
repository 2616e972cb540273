//! Engine configuration loaded from TOML.
//!
//! `SharedConfig` captures every pipeline setting an embedding host may want
//! to pin in a file: where the cache lives, how many coordinates load at
//! once, time budgets, integrity requirements, the cache size limit and the
//! repositories used for coordinates that declare none. Every field has a
//! default, so an empty document is a valid configuration.
//!
//! ```toml
//! cache_dir = "/var/cache/loadstone"
//! concurrency = 8
//! request_timeout_secs = 20
//! coordinate_timeout_secs = 120
//!
//! [verification]
//! require_integrity = true
//!
//! [eviction]
//! max_cache_bytes = 536870912
//!
//! [[repositories]]
//! name = "central"
//! url = "https://repo1.maven.org/maven2/"
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use loadstone_common::error::ModelError;
use loadstone_common::repository::Repository;
use loadstone_loader::cache::{CacheError, EvictionPolicy};
use loadstone_loader::dirs::{BaseDirs, SystemBaseDirs, default_cache_dir};
use loadstone_loader::fetch::download::DEFAULT_REQUEST_TIMEOUT;
use loadstone_loader::fetch::verification::VerificationPolicy;
use loadstone_loader::pipeline::DEFAULT_CONCURRENCY;
use loadstone_loader::{HostInjector, Pipeline, PipelineConfig};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Errors raised while loading or applying a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("invalid configuration: {source}")]
    Parse {
        /// Parser diagnostic.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A fallback repository entry is not usable.
    #[error("invalid fallback repository: {0}")]
    Repository(#[from] ModelError),

    /// `cache_dir` was omitted and no default could be determined.
    #[error("no cache directory configured and the platform provides none")]
    NoCacheDir,

    /// The cache directory could not be opened.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Pipeline settings as written in a configuration file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SharedConfig {
    /// Cache root. Falls back to `LOADSTONE_CACHE_DIR`, then the platform
    /// cache directory.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Coordinates processed at once. Zero is treated as one.
    pub concurrency: usize,
    /// Upper bound on each HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Budget for one coordinate, in seconds. Unlimited when absent.
    pub coordinate_timeout_secs: Option<u64>,
    /// Integrity requirements.
    pub verification: VerificationConfig,
    /// Cache size limit.
    pub eviction: EvictionConfig,
    /// Repositories used for coordinates that declare none.
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            coordinate_timeout_secs: None,
            verification: VerificationConfig::default(),
            eviction: EvictionConfig::default(),
            repositories: Vec::new(),
        }
    }
}

/// `[verification]` table.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationConfig {
    /// Reject artifacts that cannot be checked against any digest.
    pub require_integrity: bool,
    /// Consult repository checksum files when a coordinate pins no digest.
    pub fetch_remote_checksums: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        let policy = VerificationPolicy::default();
        Self {
            require_integrity: policy.require_integrity(),
            fetch_remote_checksums: policy.fetch_remote_checksums(),
        }
    }
}

/// `[eviction]` table.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EvictionConfig {
    /// Total cache size to evict down to after each batch.
    pub max_cache_bytes: Option<u64>,
}

/// One `[[repositories]]` entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Base URL of a Maven-layout repository.
    pub url: String,
    /// Display name used in logs.
    #[serde(default)]
    pub name: Option<String>,
}

impl RepositoryConfig {
    fn to_repository(&self) -> Result<Repository, ModelError> {
        match &self.name {
            Some(name) => Repository::named(&self.url, name),
            None => Repository::new(&self.url),
        }
    }
}

impl SharedConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML, unknown keys or
    /// mistyped values.
    ///
    /// # Examples
    ///
    /// ```
    /// use loadstone::SharedConfig;
    ///
    /// let config = SharedConfig::from_toml_str("concurrency = 2\n").expect("valid config");
    /// assert_eq!(config.concurrency, 2);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            source: Box::new(source),
        })
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when its contents are invalid.
    pub fn load_from(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(target: "loadstone::config", "loaded configuration from {path}");
        Self::from_toml_str(&source)
    }

    /// Convert into pipeline settings, resolving the default cache
    /// directory from the environment and platform.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Repository`] for an invalid fallback
    /// repository and [`ConfigError::NoCacheDir`] when no cache directory
    /// can be determined.
    pub fn into_pipeline_config(self) -> Result<PipelineConfig, ConfigError> {
        self.into_pipeline_config_with(&SystemBaseDirs)
    }

    /// Like [`Self::into_pipeline_config`], with an explicit source of
    /// platform directories.
    ///
    /// # Errors
    ///
    /// See [`Self::into_pipeline_config`].
    pub fn into_pipeline_config_with(
        self,
        dirs: &dyn BaseDirs,
    ) -> Result<PipelineConfig, ConfigError> {
        let repositories = self
            .repositories
            .iter()
            .map(RepositoryConfig::to_repository)
            .collect::<Result<Vec<_>, _>>()?;
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir(dirs).ok_or(ConfigError::NoCacheDir)?,
        };
        let eviction = self
            .eviction
            .max_cache_bytes
            .map_or_else(EvictionPolicy::unbounded, EvictionPolicy::bounded);

        Ok(PipelineConfig::new(cache_dir)
            .with_concurrency(self.concurrency)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_coordinate_timeout(self.coordinate_timeout_secs.map(Duration::from_secs))
            .with_verification(VerificationPolicy::new(
                self.verification.require_integrity,
                self.verification.fetch_remote_checksums,
            ))
            .with_eviction(eviction)
            .with_fallback_repositories(repositories))
    }

    /// Build a pipeline that hands artifacts to `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the settings are invalid or the cache
    /// directory cannot be opened.
    pub fn build_pipeline(self, host: Arc<dyn HostInjector>) -> Result<Pipeline, ConfigError> {
        let config = self.into_pipeline_config()?;
        Ok(Pipeline::new(config, host)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    struct NoPlatformDirs;

    impl BaseDirs for NoPlatformDirs {
        fn cache_dir(&self) -> Option<PathBuf> {
            None
        }
    }

    #[rstest]
    fn defaults_match_the_pipeline_defaults() {
        let config = SharedConfig::default();

        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.verification.require_integrity);
        assert!(config.verification.fetch_remote_checksums);
        assert_eq!(config.eviction.max_cache_bytes, None);
    }

    #[rstest]
    fn empty_document_is_the_default() {
        let config = SharedConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(config, SharedConfig::default());
    }

    #[rstest]
    fn deserialises_nested_tables() {
        let source = concat!(
            "cache_dir = \"/srv/cache\"\n",
            "coordinate_timeout_secs = 90\n",
            "[verification]\n",
            "require_integrity = true\n",
            "[eviction]\n",
            "max_cache_bytes = 1024\n",
            "[[repositories]]\n",
            "url = \"https://repo.example/maven/\"\n",
            "name = \"example\"\n",
        );

        let config = SharedConfig::from_toml_str(source).expect("config parses");

        assert_eq!(config.cache_dir.as_deref(), Some(Utf8Path::new("/srv/cache")));
        assert_eq!(config.coordinate_timeout_secs, Some(90));
        assert!(config.verification.require_integrity);
        assert!(config.verification.fetch_remote_checksums);
        assert_eq!(config.eviction.max_cache_bytes, Some(1024));
        assert_eq!(config.repositories.len(), 1);
    }

    #[rstest]
    #[case::unknown_top_level("unexpected = true\n")]
    #[case::unknown_nested("[verification]\nstrict = true\n")]
    #[case::mistyped("concurrency = \"many\"\n")]
    #[case::repository_without_url("[[repositories]]\nname = \"x\"\n")]
    fn rejects_invalid_documents(#[case] source: &str) {
        let outcome = SharedConfig::from_toml_str(source);
        assert!(
            matches!(outcome, Err(ConfigError::Parse { .. })),
            "expected a parse error, got {outcome:?}"
        );
    }

    #[rstest]
    fn converts_into_pipeline_settings() {
        let config = SharedConfig {
            cache_dir: Some(Utf8PathBuf::from("/srv/cache")),
            concurrency: 0,
            request_timeout_secs: 5,
            coordinate_timeout_secs: Some(60),
            verification: VerificationConfig {
                require_integrity: true,
                fetch_remote_checksums: false,
            },
            eviction: EvictionConfig {
                max_cache_bytes: Some(4096),
            },
            repositories: vec![RepositoryConfig {
                url: "https://repo.example/maven".to_owned(),
                name: None,
            }],
        };

        let pipeline = config
            .into_pipeline_config_with(&NoPlatformDirs)
            .expect("valid settings");

        assert_eq!(pipeline.cache_dir, Utf8PathBuf::from("/srv/cache"));
        assert_eq!(pipeline.concurrency, 1);
        assert_eq!(pipeline.request_timeout, Duration::from_secs(5));
        assert_eq!(pipeline.coordinate_timeout, Some(Duration::from_secs(60)));
        assert_eq!(pipeline.verification, VerificationPolicy::new(true, false));
        assert_eq!(pipeline.eviction, EvictionPolicy::bounded(4096));
        assert_eq!(pipeline.fallback_repositories.len(), 1);
    }

    #[rstest]
    fn invalid_fallback_repository_is_reported() {
        let config = SharedConfig {
            cache_dir: Some(Utf8PathBuf::from("/srv/cache")),
            repositories: vec![RepositoryConfig {
                url: "ftp://repo.example/".to_owned(),
                name: None,
            }],
            ..SharedConfig::default()
        };

        let outcome = config.into_pipeline_config_with(&NoPlatformDirs);

        assert!(matches!(outcome, Err(ConfigError::Repository(_))));
    }

    #[rstest]
    fn missing_cache_dir_without_defaults_is_an_error() {
        let outcome = temp_env::with_var_unset(loadstone_loader::dirs::CACHE_DIR_ENV, || {
            SharedConfig::default().into_pipeline_config_with(&NoPlatformDirs)
        });

        assert!(matches!(outcome, Err(ConfigError::NoCacheDir)));
    }
}
