//! Candidate URL construction.
//!
//! Resolution is pure: the same coordinate and repository list always yield
//! the same candidate sequence, in declared repository order.

use loadstone_common::coordinate::Coordinate;
use loadstone_common::digest::DigestAlgorithm;
use loadstone_common::repository::Repository;
use std::collections::HashSet;

/// One place an artifact may be downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    repository: Repository,
    url: String,
}

impl Candidate {
    /// The repository this candidate belongs to.
    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Full artifact URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL of the checksum file the repository publishes next to the
    /// artifact (`<url>.sha256`).
    #[must_use]
    pub fn checksum_url(&self, algorithm: DigestAlgorithm) -> String {
        format!("{}.{}", self.url, algorithm.label())
    }
}

/// Errors from candidate resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Neither the coordinate nor the resolver supplied a repository.
    #[error("no repositories configured for {coordinate}")]
    NoRepositories {
        /// Label of the coordinate.
        coordinate: String,
    },
}

/// Builds candidate URLs, falling back to configured repositories when a
/// coordinate declares none.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    fallback: Vec<Repository>,
}

impl Resolver {
    /// Create a resolver with fallback repositories.
    #[must_use]
    pub fn new(fallback: Vec<Repository>) -> Self {
        Self { fallback }
    }

    /// Fallback repositories in priority order.
    #[must_use]
    pub fn fallback(&self) -> &[Repository] {
        &self.fallback
    }

    /// Produce the ordered candidate list for `coordinate`.
    ///
    /// Repositories repeating an earlier base URL are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoRepositories`] when there is nothing to try.
    pub fn resolve(&self, coordinate: &Coordinate) -> Result<Vec<Candidate>, ResolveError> {
        let repositories = if coordinate.repositories().is_empty() {
            &self.fallback
        } else {
            coordinate.repositories()
        };

        let mut seen = HashSet::new();
        let candidates: Vec<Candidate> = repositories
            .iter()
            .filter(|repository| seen.insert(repository.url()))
            .map(|repository| Candidate {
                repository: repository.clone(),
                url: artifact_url(repository, coordinate),
            })
            .collect();

        if candidates.is_empty() {
            return Err(ResolveError::NoRepositories {
                coordinate: coordinate.to_string(),
            });
        }
        Ok(candidates)
    }
}

/// Absolute artifact URL of `coordinate` within `repository`.
///
/// # Examples
///
/// ```
/// use loadstone_common::coordinate::Coordinate;
/// use loadstone_common::repository::Repository;
/// use loadstone_loader::resolver::artifact_url;
///
/// let repo = Repository::new("https://repo.a").unwrap();
/// let coordinate = Coordinate::builder()
///     .group("org.example")
///     .artifact("foo")
///     .version("1.0.0")
///     .build()
///     .unwrap();
/// assert_eq!(
///     artifact_url(&repo, &coordinate),
///     "https://repo.a/org/example/foo/1.0.0/foo-1.0.0.jar"
/// );
/// ```
#[must_use]
pub fn artifact_url(repository: &Repository, coordinate: &Coordinate) -> String {
    format!(
        "{}{}{}",
        repository.url(),
        coordinate.url_location(),
        coordinate.file_name()
    )
}
