//! Cache keys.

use camino::Utf8PathBuf;
use loadstone_common::coordinate::Coordinate;
use loadstone_common::relocation::RuleFingerprint;
use std::fmt;

/// Variant segment used when a coordinate has no classifier.
const DEFAULT_VARIANT: &str = "default";

/// Deterministic address of one cache entry: a coordinate plus the
/// fingerprint of the rules applied to it.
///
/// # Examples
///
/// ```
/// use loadstone_common::coordinate::Coordinate;
/// use loadstone_common::relocation::RuleFingerprint;
/// use loadstone_loader::cache::key::CacheKey;
///
/// let coordinate = Coordinate::builder()
///     .group("org.example")
///     .artifact("foo")
///     .version("1.0.0")
///     .build()
///     .unwrap();
/// let key = CacheKey::new(&coordinate, RuleFingerprint::Raw);
/// assert_eq!(key.relative_dir().as_str(), "org.example/foo/1.0.0/default-raw");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    group: String,
    artifact: String,
    version: String,
    variant: String,
    fingerprint: RuleFingerprint,
}

impl CacheKey {
    /// Key for `coordinate` under `fingerprint`.
    #[must_use]
    pub fn new(coordinate: &Coordinate, fingerprint: RuleFingerprint) -> Self {
        Self {
            group: coordinate.group().to_owned(),
            artifact: coordinate.artifact().to_owned(),
            version: coordinate.version().to_owned(),
            variant: coordinate
                .classifier()
                .unwrap_or(DEFAULT_VARIANT)
                .to_owned(),
            fingerprint,
        }
    }

    /// Key of the unrelocated artifact for `coordinate`.
    #[must_use]
    pub fn raw(coordinate: &Coordinate) -> Self {
        Self::new(coordinate, RuleFingerprint::Raw)
    }

    /// Key of `coordinate` under its own relocation rules.
    #[must_use]
    pub fn for_rules(coordinate: &Coordinate) -> Self {
        Self::new(coordinate, coordinate.relocations().fingerprint())
    }

    /// Rule-set fingerprint part of the key.
    #[must_use]
    pub fn fingerprint(&self) -> &RuleFingerprint {
        &self.fingerprint
    }

    /// Return true when the key addresses a relocated artifact.
    #[must_use]
    pub fn is_relocated(&self) -> bool {
        matches!(self.fingerprint, RuleFingerprint::Relocated(_))
    }

    /// Entry directory relative to the cache root.
    #[must_use]
    pub fn relative_dir(&self) -> Utf8PathBuf {
        let mut dir = Utf8PathBuf::from(&self.group);
        dir.push(&self.artifact);
        dir.push(&self.version);
        dir.push(format!("{}-{}", self.variant, self.fingerprint.segment()));
        dir
    }

    /// Archive file name inside the entry directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut name = format!("{}-{}", self.artifact, self.version);
        if self.variant != DEFAULT_VARIANT {
            name.push('-');
            name.push_str(&self.variant);
        }
        if self.is_relocated() {
            name.push_str("-relocated");
        }
        name.push_str(".jar");
        name
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}@{}",
            self.group,
            self.artifact,
            self.version,
            self.variant,
            self.fingerprint.segment()
        )
    }
}
