//! Artifact coordinates.
//!
//! A [`Coordinate`] names one pinned artifact (`group:artifact:version`, plus
//! an optional classifier) together with everything needed to load it: the
//! repositories to try, the relocation rules to apply, and the expected
//! digest. Identity, equality and hashing use only the naming fields.

use crate::digest::IntegrityDescriptor;
use crate::error::{ModelError, Result};
use crate::relocation::{RelocationRule, RelocationSet};
use crate::repository::Repository;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Packaging extension of every artifact the loader handles.
pub const ARTIFACT_EXTENSION: &str = "jar";

/// An immutable, validated artifact coordinate.
///
/// # Examples
///
/// ```
/// use loadstone_common::coordinate::Coordinate;
/// use loadstone_common::repository::Repository;
///
/// let coordinate = Coordinate::builder()
///     .group("org.example")
///     .artifact("foo")
///     .version("1.0.0")
///     .repository(Repository::maven_central())
///     .relocate("org.example.internal", "shaded.foo.internal")
///     .build()
///     .unwrap();
///
/// assert_eq!(coordinate.to_string(), "org.example:foo:1.0.0");
/// assert_eq!(coordinate.url_location(), "org/example/foo/1.0.0/");
/// assert_eq!(coordinate.file_name(), "foo-1.0.0.jar");
/// ```
#[derive(Debug, Clone)]
pub struct Coordinate {
    group: String,
    artifact: String,
    version: String,
    classifier: Option<String>,
    repositories: Vec<Repository>,
    relocations: RelocationSet,
    integrity: Option<IntegrityDescriptor>,
}

impl Coordinate {
    /// Start building a coordinate.
    #[must_use]
    pub fn builder() -> CoordinateBuilder {
        CoordinateBuilder::default()
    }

    /// Group identifier (`org.example`).
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Artifact identifier (`foo`).
    #[must_use]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Pinned version (`1.0.0`).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Optional classifier (`sources`, `jdk8`, ...).
    #[must_use]
    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    /// Candidate repositories in declared order.
    #[must_use]
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Relocation rules to apply after download.
    #[must_use]
    pub fn relocations(&self) -> &RelocationSet {
        &self.relocations
    }

    /// Expected digest of the raw artifact, if the caller supplied one.
    #[must_use]
    pub fn integrity(&self) -> Option<&IntegrityDescriptor> {
        self.integrity.as_ref()
    }

    /// Repository-relative directory of this coordinate
    /// (`org/example/foo/1.0.0/`).
    #[must_use]
    pub fn url_location(&self) -> String {
        format!(
            "{}/{}/{}/",
            self.group.replace('.', "/"),
            self.artifact,
            self.version
        )
    }

    /// Artifact file name (`foo-1.0.0[-classifier].jar`).
    #[must_use]
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{classifier}.{ARTIFACT_EXTENSION}",
                self.artifact, self.version
            ),
            None => format!("{}-{}.{ARTIFACT_EXTENSION}", self.artifact, self.version),
        }
    }

    fn identity(&self) -> (&str, &str, &str, Option<&str>) {
        (
            &self.group,
            &self.artifact,
            &self.version,
            self.classifier.as_deref(),
        )
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

/// Fluent builder for [`Coordinate`].
#[derive(Debug, Clone, Default)]
pub struct CoordinateBuilder {
    group: Option<String>,
    artifact: Option<String>,
    version: Option<String>,
    classifier: Option<String>,
    repositories: Vec<Repository>,
    relocations: Vec<RelocationRule>,
    pending_errors: Vec<ModelError>,
    integrity: Option<IntegrityDescriptor>,
}

impl CoordinateBuilder {
    /// Set the group identifier.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the artifact identifier.
    #[must_use]
    pub fn artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Set the version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the classifier.
    #[must_use]
    pub fn classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Append a candidate repository.
    #[must_use]
    pub fn repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Append several candidate repositories.
    #[must_use]
    pub fn repositories(mut self, repositories: impl IntoIterator<Item = Repository>) -> Self {
        self.repositories.extend(repositories);
        self
    }

    /// Add a relocation rule. Invalid prefixes surface from
    /// [`build`](Self::build).
    #[must_use]
    pub fn relocate(mut self, source: &str, target: &str) -> Self {
        match RelocationRule::new(source, target) {
            Ok(rule) => self.relocations.push(rule),
            Err(error) => self.pending_errors.push(error),
        }
        self
    }

    /// Add an already validated relocation rule.
    #[must_use]
    pub fn rule(mut self, rule: RelocationRule) -> Self {
        self.relocations.push(rule);
        self
    }

    /// Set the expected digest of the raw artifact.
    #[must_use]
    pub fn integrity(mut self, integrity: IntegrityDescriptor) -> Self {
        self.integrity = Some(integrity);
        self
    }

    /// Validate and build the coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingField`] when group, artifact or version
    /// is absent or blank, [`ModelError::InvalidField`] when a field cannot
    /// form a repository path, and [`ModelError::InvalidRelocation`] for bad
    /// or conflicting rules.
    pub fn build(self) -> Result<Coordinate> {
        if let Some(error) = self.pending_errors.into_iter().next() {
            return Err(error);
        }
        let group = required("group", self.group)?;
        let artifact = required("artifact", self.artifact)?;
        let version = required("version", self.version)?;
        let classifier = match self.classifier {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(validate_segment("classifier", value)?),
            None => None,
        };
        Ok(Coordinate {
            group,
            artifact,
            version,
            classifier,
            repositories: self.repositories,
            relocations: RelocationSet::new(self.relocations)?,
            integrity: self.integrity,
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => validate_segment(field, value),
        _ => Err(ModelError::MissingField { field }),
    }
}

fn validate_segment(field: &'static str, value: String) -> Result<String> {
    let value = value.trim().to_owned();
    let invalid = |reason: &str| ModelError::InvalidField {
        field,
        value: value.clone(),
        reason: reason.to_owned(),
    };
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '/' | '\\' | ':'))
    {
        return Err(invalid(&format!("contains '{bad}'")));
    }
    if value.contains("..") || value.starts_with('.') || value.ends_with('.') {
        return Err(invalid("dots may only separate segments"));
    }
    Ok(value)
}

/// Unvalidated coordinate as supplied by a caller or decoded from data.
///
/// Converting into a [`Coordinate`] performs every check, so a malformed
/// entry in a batch can be reported on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinateDescriptor {
    /// Group identifier.
    pub group: Option<String>,
    /// Artifact identifier.
    pub artifact: Option<String>,
    /// Version.
    pub version: Option<String>,
    /// Optional classifier.
    pub classifier: Option<String>,
    /// Repository base URLs in priority order.
    pub repositories: Vec<String>,
    /// Relocation rules as `(from, to)` pairs.
    pub relocations: Vec<RelocationPair>,
    /// Expected digest written `<algorithm>:<hex>`.
    pub integrity: Option<String>,
}

/// Unvalidated relocation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelocationPair {
    /// Source prefix.
    pub from: String,
    /// Target prefix.
    pub to: String,
}

impl CoordinateDescriptor {
    /// Best-effort label for reporting, even when fields are missing.
    #[must_use]
    pub fn label(&self) -> String {
        let part = |value: &Option<String>| value.clone().unwrap_or_else(|| "?".to_owned());
        let mut label = format!(
            "{}:{}:{}",
            part(&self.group),
            part(&self.artifact),
            part(&self.version)
        );
        if let Some(classifier) = &self.classifier {
            label.push(':');
            label.push_str(classifier);
        }
        label
    }
}

impl TryFrom<CoordinateDescriptor> for Coordinate {
    type Error = ModelError;

    fn try_from(descriptor: CoordinateDescriptor) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(group) = descriptor.group {
            builder = builder.group(group);
        }
        if let Some(artifact) = descriptor.artifact {
            builder = builder.artifact(artifact);
        }
        if let Some(version) = descriptor.version {
            builder = builder.version(version);
        }
        if let Some(classifier) = descriptor.classifier {
            builder = builder.classifier(classifier);
        }
        for url in &descriptor.repositories {
            builder = builder.repository(Repository::new(url)?);
        }
        for pair in &descriptor.relocations {
            builder = builder.relocate(&pair.from, &pair.to);
        }
        if let Some(integrity) = descriptor.integrity {
            builder = builder.integrity(integrity.parse()?);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn base() -> CoordinateBuilder {
        Coordinate::builder()
            .group("org.example")
            .artifact("foo")
            .version("1.0.0")
    }

    #[test]
    fn equality_ignores_repositories_and_rules() {
        let plain = base().build().expect("valid");
        let decorated = base()
            .repository(Repository::maven_central())
            .relocate("org.example.internal", "shaded.internal")
            .build()
            .expect("valid");
        assert_eq!(plain, decorated);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&decorated));
    }

    #[test]
    fn classifier_participates_in_identity() {
        let plain = base().build().expect("valid");
        let classified = base().classifier("jdk8").build().expect("valid");
        assert_ne!(plain, classified);
        assert_eq!(classified.to_string(), "org.example:foo:1.0.0:jdk8");
        assert_eq!(classified.file_name(), "foo-1.0.0-jdk8.jar");
    }

    #[test]
    fn blank_classifier_is_dropped() {
        let coordinate = base().classifier("  ").build().expect("valid");
        assert_eq!(coordinate.classifier(), None);
    }

    #[rstest]
    #[case::no_group(Coordinate::builder().artifact("foo").version("1"), "group")]
    #[case::no_artifact(Coordinate::builder().group("g").version("1"), "artifact")]
    #[case::blank_version(Coordinate::builder().group("g").artifact("a").version(" "), "version")]
    fn missing_fields_are_named(#[case] builder: CoordinateBuilder, #[case] field: &str) {
        match builder.build() {
            Err(ModelError::MissingField { field: missing }) => assert_eq!(missing, field),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[rstest]
    #[case::slash("org/example")]
    #[case::colon("org:example")]
    #[case::traversal("..")]
    #[case::double_dot("org..example")]
    fn path_hostile_groups_are_rejected(#[case] group: &str) {
        let result = Coordinate::builder()
            .group(group)
            .artifact("foo")
            .version("1.0.0")
            .build();
        assert!(matches!(result, Err(ModelError::InvalidField { .. })));
    }

    #[test]
    fn invalid_rule_surfaces_at_build() {
        let result = base().relocate("org.example", "org.example").build();
        assert!(matches!(result, Err(ModelError::InvalidRelocation { .. })));
    }

    #[test]
    fn descriptor_converts_with_all_fields() {
        let descriptor = CoordinateDescriptor {
            group: Some("org.example".to_owned()),
            artifact: Some("foo".to_owned()),
            version: Some("1.0.0".to_owned()),
            classifier: None,
            repositories: vec!["https://repo.a/".to_owned(), "https://repo.b".to_owned()],
            relocations: vec![RelocationPair {
                from: "org.example.internal".to_owned(),
                to: "shaded.foo.internal".to_owned(),
            }],
            integrity: Some(format!("sha256:{}", "a".repeat(64))),
        };
        let coordinate = Coordinate::try_from(descriptor).expect("valid descriptor");
        assert_eq!(coordinate.repositories().len(), 2);
        assert_eq!(coordinate.relocations().len(), 1);
        assert!(coordinate.integrity().is_some());
    }

    #[test]
    fn descriptor_label_marks_missing_fields() {
        let descriptor = CoordinateDescriptor {
            group: Some("org.example".to_owned()),
            ..CoordinateDescriptor::default()
        };
        assert_eq!(descriptor.label(), "org.example:?:?");
        assert!(matches!(
            Coordinate::try_from(descriptor),
            Err(ModelError::MissingField { field: "artifact" })
        ));
    }

    #[test]
    fn descriptor_with_bad_repository_fails() {
        let descriptor = CoordinateDescriptor {
            group: Some("g".to_owned()),
            artifact: Some("a".to_owned()),
            version: Some("1".to_owned()),
            repositories: vec!["not a url".to_owned()],
            ..CoordinateDescriptor::default()
        };
        assert!(matches!(
            Coordinate::try_from(descriptor),
            Err(ModelError::InvalidRepository { .. })
        ));
    }
}
