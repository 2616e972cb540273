//! Relocation rules and rule sets.
//!
//! A [`RelocationRule`] maps a source package prefix to a target prefix in
//! dotted notation (`org.example.internal`). A [`RelocationSet`] is the
//! validated collection applied to one artifact; its
//! [`fingerprint`](RelocationSet::fingerprint) addresses the relocated cache
//! entry.

use crate::digest::Sha256Digest;
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single namespace rewrite from `source` to `target`.
///
/// # Examples
///
/// ```
/// use loadstone_common::relocation::RelocationRule;
///
/// let rule = RelocationRule::new("org.example.internal", "shaded.foo.internal").unwrap();
/// assert_eq!(rule.source_internal(), "org/example/internal");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct RelocationRule {
    source: String,
    target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    from: String,
    to: String,
}

impl RelocationRule {
    /// Build a rule, accepting dotted or slash-separated prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidRelocation`] when either prefix is not a
    /// dotted sequence of Java identifiers, or when both are equal.
    pub fn new(source: &str, target: &str) -> Result<Self> {
        let source = normalise_prefix(source, "source")?;
        let target = normalise_prefix(target, "target")?;
        if source == target {
            return Err(ModelError::InvalidRelocation {
                reason: format!("source and target are both \"{source}\""),
            });
        }
        Ok(Self { source, target })
    }

    /// Source prefix in dotted form.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Target prefix in dotted form.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Source prefix in internal (slash-separated) form.
    #[must_use]
    pub fn source_internal(&self) -> String {
        self.source.replace('.', "/")
    }

    /// Target prefix in internal (slash-separated) form.
    #[must_use]
    pub fn target_internal(&self) -> String {
        self.target.replace('.', "/")
    }

    /// Return true when the target lives inside the source namespace, so a
    /// relocated artifact legitimately still mentions the source prefix.
    #[must_use]
    pub fn target_nests_source(&self) -> bool {
        self.target
            .strip_prefix(&self.source)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for RelocationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

impl TryFrom<RawRule> for RelocationRule {
    type Error = ModelError;

    fn try_from(raw: RawRule) -> Result<Self> {
        Self::new(&raw.from, &raw.to)
    }
}

impl From<RelocationRule> for RawRule {
    fn from(rule: RelocationRule) -> Self {
        Self {
            from: rule.source,
            to: rule.target,
        }
    }
}

/// Identifies which rule set produced a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleFingerprint {
    /// No rules: the artifact as downloaded.
    Raw,
    /// Digest of the canonical rule listing.
    Relocated(Sha256Digest),
}

impl RuleFingerprint {
    /// Length of the digest prefix used in cache paths.
    pub const SHORT_LEN: usize = 16;

    /// Path segment for this fingerprint (`raw` or `relocated-<hex16>`).
    #[must_use]
    pub fn segment(&self) -> String {
        match self {
            Self::Raw => "raw".to_owned(),
            Self::Relocated(digest) => format!("relocated-{}", digest.short(Self::SHORT_LEN)),
        }
    }
}

impl fmt::Display for RuleFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Relocated(digest) => write!(f, "{digest}"),
        }
    }
}

/// The validated rules applied to one artifact.
///
/// Rules are held longest-source-first, which is the order the relocation
/// engine tries them in. Declaration order does not affect the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<RelocationRule>", into = "Vec<RelocationRule>")]
pub struct RelocationSet {
    rules: Vec<RelocationRule>,
}

impl RelocationSet {
    /// Build a rule set.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidRelocation`] when two rules share a
    /// source prefix.
    pub fn new(mut rules: Vec<RelocationRule>) -> Result<Self> {
        rules.sort_by(|a, b| {
            b.source
                .len()
                .cmp(&a.source.len())
                .then_with(|| a.source.cmp(&b.source))
        });
        if let Some(pair) = rules.windows(2).find(|pair| match pair {
            [a, b] => a.source == b.source,
            _ => false,
        }) {
            let source = pair.first().map(RelocationRule::source).unwrap_or_default();
            return Err(ModelError::InvalidRelocation {
                reason: format!("source \"{source}\" is relocated more than once"),
            });
        }
        Ok(Self { rules })
    }

    /// Return true when there is nothing to relocate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Iterate rules longest-source-first.
    pub fn iter(&self) -> impl Iterator<Item = &RelocationRule> {
        self.rules.iter()
    }

    /// Deterministic identity of this rule set.
    #[must_use]
    pub fn fingerprint(&self) -> RuleFingerprint {
        if self.rules.is_empty() {
            return RuleFingerprint::Raw;
        }
        let mut canonical: Vec<&RelocationRule> = self.rules.iter().collect();
        canonical.sort_by(|a, b| a.source.cmp(&b.source));
        let listing: String = canonical
            .iter()
            .map(|rule| format!("{}=>{}\n", rule.source, rule.target))
            .collect();
        RuleFingerprint::Relocated(Sha256Digest::of(listing.as_bytes()))
    }
}

impl TryFrom<Vec<RelocationRule>> for RelocationSet {
    type Error = ModelError;

    fn try_from(rules: Vec<RelocationRule>) -> Result<Self> {
        Self::new(rules)
    }
}

impl From<RelocationSet> for Vec<RelocationRule> {
    fn from(set: RelocationSet) -> Self {
        set.rules
    }
}

fn normalise_prefix(value: &str, role: &str) -> Result<String> {
    let dotted = value.trim().replace('/', ".");
    let invalid = |reason: String| ModelError::InvalidRelocation {
        reason: format!("{role} \"{value}\" {reason}"),
    };
    if dotted.is_empty() {
        return Err(invalid("is empty".to_owned()));
    }
    for segment in dotted.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            None => return Err(invalid("has an empty segment".to_owned())),
            Some(first) if first.is_ascii_digit() => {
                return Err(invalid(format!("segment \"{segment}\" starts with a digit")));
            }
            Some(_) => {}
        }
        if let Some(bad) = segment.chars().find(|c| !is_identifier_char(*c)) {
            return Err(invalid(format!("contains '{bad}'")));
        }
    }
    Ok(dotted)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
