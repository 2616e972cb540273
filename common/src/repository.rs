//! Remote Maven-layout repositories.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote repository serving artifacts in the standard
/// `group/artifact/version` layout.
///
/// The base URL always ends in `/` so candidate URLs can be built by plain
/// concatenation.
///
/// # Examples
///
/// ```
/// use loadstone_common::repository::Repository;
///
/// let repo = Repository::new("https://repo.example.test/maven2").unwrap();
/// assert_eq!(repo.url(), "https://repo.example.test/maven2/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRepository", into = "RawRepository")]
pub struct Repository {
    url: String,
    name: Option<String>,
}

/// Serde shape of a [`Repository`] before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRepository {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Repository {
    /// Create an unnamed repository.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidRepository`] unless `url` is an absolute
    /// `http` or `https` URL with a host.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: normalise_url(url)?,
            name: None,
        })
    }

    /// Create a repository with a display name.
    ///
    /// # Errors
    ///
    /// See [`Repository::new`].
    pub fn named(url: &str, name: &str) -> Result<Self> {
        let mut repository = Self::new(url)?;
        repository.name = Some(name.to_owned());
        Ok(repository)
    }

    /// Maven Central.
    #[must_use]
    pub fn maven_central() -> Self {
        Self::preset("https://repo1.maven.org/maven2/", "Maven Central")
    }

    /// JitPack.
    #[must_use]
    pub fn jitpack() -> Self {
        Self::preset("https://jitpack.io/", "JitPack")
    }

    /// Sonatype OSS snapshots.
    #[must_use]
    pub fn sonatype_snapshots() -> Self {
        Self::preset(
            "https://oss.sonatype.org/content/repositories/snapshots/",
            "Sonatype",
        )
    }

    fn preset(url: &str, name: &str) -> Self {
        Self {
            url: url.to_owned(),
            name: Some(name.to_owned()),
        }
    }

    /// Return the normalised base URL (always ends in `/`).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.url),
            None => f.write_str(&self.url),
        }
    }
}

impl TryFrom<RawRepository> for Repository {
    type Error = ModelError;

    fn try_from(raw: RawRepository) -> Result<Self> {
        match raw.name {
            Some(name) => Self::named(&raw.url, &name),
            None => Self::new(&raw.url),
        }
    }
}

impl From<Repository> for RawRepository {
    fn from(repository: Repository) -> Self {
        Self {
            url: repository.url,
            name: repository.name,
        }
    }
}

fn normalise_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    let invalid = |reason: &str| ModelError::InvalidRepository {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| invalid("scheme must be http or https"))?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }
    if trimmed.ends_with('/') {
        Ok(trimmed.to_owned())
    } else {
        Ok(format!("{trimmed}/"))
    }
}
