//! Prefix matching and rewriting over raw bytes.
//!
//! Each rule contributes two patterns: the internal (slash) form used by
//! class names and descriptors, and the dotted form used by string
//! constants and text resources. Patterns are tried longest first, in a
//! single left-to-right pass, so a target is never rewritten again.

use loadstone_common::relocation::{RelocationRule, RelocationSet};
use std::borrow::Cow;

/// Bytes that may precede a descriptor's `L` type tag.
const DESCRIPTOR_OPENERS: &[u8] = b"()[;<>:^+-*";

#[derive(Debug, Clone)]
struct Pattern {
    source: Vec<u8>,
    target: Vec<u8>,
    rule: usize,
}

/// Compiled form of a [`RelocationSet`].
#[derive(Debug, Clone)]
pub struct Rewriter {
    rules: Vec<RelocationRule>,
    patterns: Vec<Pattern>,
}

impl Rewriter {
    /// Compile `rules` into byte patterns.
    #[must_use]
    pub fn new(rules: &RelocationSet) -> Self {
        let rules: Vec<RelocationRule> = rules.iter().cloned().collect();
        let mut patterns = Vec::with_capacity(rules.len() * 2);
        for (index, rule) in rules.iter().enumerate() {
            patterns.push(Pattern {
                source: rule.source_internal().into_bytes(),
                target: rule.target_internal().into_bytes(),
                rule: index,
            });
            patterns.push(Pattern {
                source: rule.source().as_bytes().to_vec(),
                target: rule.target().as_bytes().to_vec(),
                rule: index,
            });
        }
        patterns.sort_by(|a, b| b.source.len().cmp(&a.source.len()));
        Self { rules, patterns }
    }

    /// Rewrite every bounded occurrence of a source prefix in `input`.
    #[must_use]
    pub fn rewrite<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        if !self.patterns.iter().any(|pattern| contains(input, &pattern.source)) {
            return Cow::Borrowed(input);
        }
        let mut output = Vec::with_capacity(input.len());
        let mut position = 0;
        while let Some(rest) = input.get(position..) {
            if rest.is_empty() {
                break;
            }
            if let Some(pattern) = self.match_at(input, position) {
                output.extend_from_slice(&pattern.target);
                position += pattern.source.len();
            } else {
                output.extend(rest.first());
                position += 1;
            }
        }
        Cow::Owned(output)
    }

    /// Rewrite a structural entry name. Only a prefix at the very start of
    /// the name is rewritten, in internal (slash) form.
    #[must_use]
    pub fn rewrite_path(&self, name: &str) -> String {
        self.rewrite_anchored(name, b'/')
    }

    /// Rewrite a dotted name anchored at its start, such as a service
    /// interface file name.
    #[must_use]
    pub fn rewrite_dotted(&self, name: &str) -> String {
        self.rewrite_anchored(name, b'.')
    }

    /// Find the first rule whose source prefix still occurs in `input`,
    /// ignoring rules whose target nests under their own source.
    #[must_use]
    pub fn find_residual(&self, input: &[u8]) -> Option<&RelocationRule> {
        (0..input.len()).find_map(|position| {
            self.match_at(input, position)
                .and_then(|pattern| self.rules.get(pattern.rule))
                .filter(|rule| !rule.target_nests_source())
        })
    }

    fn rewrite_anchored(&self, name: &str, separator: u8) -> String {
        let bytes = name.as_bytes();
        let hit = self.patterns.iter().find(|pattern| {
            is_separated(&pattern.source, separator)
                && bytes.starts_with(&pattern.source)
                && ends_at_boundary(bytes, pattern.source.len())
        });
        match hit {
            Some(pattern) => {
                let mut rewritten = pattern.target.clone();
                let rest = bytes.get(pattern.source.len()..).unwrap_or_default();
                rewritten.extend_from_slice(rest);
                String::from_utf8(rewritten).unwrap_or_else(|_| name.to_owned())
            }
            None => name.to_owned(),
        }
    }

    fn match_at(&self, input: &[u8], position: usize) -> Option<&Pattern> {
        if !starts_at_boundary(input, position) {
            return None;
        }
        let rest = input.get(position..)?;
        self.patterns.iter().find(|pattern| {
            rest.starts_with(&pattern.source)
                && ends_at_boundary(input, position + pattern.source.len())
        })
    }
}

/// Java identifier bytes. Non-ASCII bytes count as identifier parts.
fn is_identifier(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || !byte.is_ascii()
}

fn is_separator_free(byte: u8) -> bool {
    !is_identifier(byte) && byte != b'.' && byte != b'/'
}

/// A match starts at a boundary when nothing name-like precedes it. The
/// descriptor marker `L` and the leading `/` of an absolute resource path
/// are skipped over when they are themselves unattached.
fn starts_at_boundary(input: &[u8], position: usize) -> bool {
    let Some(before) = position.checked_sub(1) else {
        return true;
    };
    match input.get(before) {
        None => true,
        Some(b'L') => match before.checked_sub(1) {
            None => true,
            Some(opener) => input
                .get(opener)
                .is_some_and(|byte| DESCRIPTOR_OPENERS.contains(byte)),
        },
        Some(b'/') => match before.checked_sub(1) {
            None => true,
            Some(prior) => input.get(prior).is_none_or(|&byte| is_separator_free(byte)),
        },
        Some(&byte) => is_separator_free(byte),
    }
}

fn ends_at_boundary(input: &[u8], end: usize) -> bool {
    input.get(end).is_none_or(|&byte| !is_identifier(byte))
}

fn is_separated(pattern: &[u8], separator: u8) -> bool {
    let other = if separator == b'/' { b'.' } else { b'/' };
    !pattern.contains(&other)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn rules(pairs: &[(&str, &str)]) -> RelocationSet {
        RelocationSet::new(
            pairs
                .iter()
                .map(|(source, target)| RelocationRule::new(source, target).expect("rule"))
                .collect(),
        )
        .expect("rule set")
    }

    #[fixture]
    fn rewriter() -> Rewriter {
        Rewriter::new(&rules(&[
            ("org.example.internal", "shaded.foo.internal"),
            ("org.example", "shaded.foo"),
        ]))
    }

    #[rstest]
    #[case::internal_name("org/example/internal/Util", "shaded/foo/internal/Util")]
    #[case::dotted_name("org.example.internal.Util", "shaded.foo.internal.Util")]
    #[case::descriptor("(Lorg/example/Api;I)V", "(Lshaded/foo/Api;I)V")]
    #[case::descriptor_start("Lorg/example/internal/Util;", "Lshaded/foo/internal/Util;")]
    #[case::array("[Lorg/example/Api;", "[Lshaded/foo/Api;")]
    #[case::generic(
        "Ljava/util/List<Lorg/example/Api;>;",
        "Ljava/util/List<Lshaded/foo/Api;>;"
    )]
    #[case::two_args(
        "(Ljava/lang/String;Lorg/example/Api;)V",
        "(Ljava/lang/String;Lshaded/foo/Api;)V"
    )]
    #[case::manifest_value("Main-Class: org.example.Main", "Main-Class: shaded.foo.Main")]
    #[case::exact_package("org.example", "shaded.foo")]
    #[case::absolute_resource(
        "/org/example/internal/config.properties",
        "/shaded/foo/internal/config.properties"
    )]
    #[case::quoted_resource(
        "load(\"/org/example/app.properties\")",
        "load(\"/shaded/foo/app.properties\")"
    )]
    #[case::classpath_url("classpath:/org/example/Api.class", "classpath:/shaded/foo/Api.class")]
    fn rewrites_bounded_occurrences(
        rewriter: Rewriter,
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(
            rewriter.rewrite(input.as_bytes()).as_ref(),
            expected.as_bytes()
        );
    }

    #[rstest]
    #[case::longer_segment("org/examples/Api")]
    #[case::nested_in_other_package("com/org/example/Api")]
    #[case::dotted_nested("com.org.example.Api")]
    #[case::identifier_before("xorg.example.Api")]
    #[case::class_named_l("com/Lorg/example/Api")]
    #[case::resource_under_other_package("/com/org/example/Api")]
    #[case::double_slash("com//org/example/Api")]
    #[case::dotted_then_slash("com./org/example/Api")]
    #[case::unrelated("java/lang/Object")]
    fn leaves_unbounded_text_alone(rewriter: Rewriter, #[case] input: &str) {
        assert_eq!(rewriter.rewrite(input.as_bytes()).as_ref(), input.as_bytes());
    }

    #[rstest]
    fn longest_prefix_wins(rewriter: Rewriter) {
        let rewritten = rewriter.rewrite(b"org/example/internal/A org/example/B");
        assert_eq!(rewritten.as_ref(), b"shaded/foo/internal/A shaded/foo/B");
    }

    #[rstest]
    fn entry_paths_are_anchored(rewriter: Rewriter) {
        assert_eq!(
            rewriter.rewrite_path("org/example/internal/Util.class"),
            "shaded/foo/internal/Util.class"
        );
        assert_eq!(rewriter.rewrite_path("org/example/"), "shaded/foo/");
        assert_eq!(
            rewriter.rewrite_path("assets/org/example/logo.png"),
            "assets/org/example/logo.png"
        );
        assert_eq!(
            rewriter.rewrite_path("org/examples/A.class"),
            "org/examples/A.class"
        );
    }

    #[rstest]
    fn dotted_names_are_anchored(rewriter: Rewriter) {
        assert_eq!(
            rewriter.rewrite_dotted("org.example.spi.Plugin"),
            "shaded.foo.spi.Plugin"
        );
        assert_eq!(rewriter.rewrite_dotted("com.acme.Plugin"), "com.acme.Plugin");
    }

    #[test]
    fn chained_rules_leave_a_residual() {
        let rewriter = Rewriter::new(&rules(&[
            ("a.b", "org.example.internal"),
            ("org.example.internal", "x.y"),
        ]));
        let rewritten = rewriter.rewrite(b"a/b/Foo");
        assert_eq!(rewritten.as_ref(), b"org/example/internal/Foo");
        let residual = rewriter.find_residual(&rewritten).expect("residual");
        assert_eq!(residual.source(), "org.example.internal");
    }

    #[test]
    fn absolute_resource_residual_is_found() {
        let rewriter = Rewriter::new(&rules(&[
            ("a.b", "org.example.internal"),
            ("org.example.internal", "x.y"),
        ]));
        let rewritten = rewriter.rewrite(b"/a/b/config.properties");
        assert_eq!(rewritten.as_ref(), b"/org/example/internal/config.properties");
        let residual = rewriter.find_residual(&rewritten).expect("residual");
        assert_eq!(residual.source(), "org.example.internal");
    }

    #[test]
    fn nested_target_is_not_a_residual() {
        let rewriter = Rewriter::new(&rules(&[("org.example", "org.example.shaded")]));
        let rewritten = rewriter.rewrite(b"org/example/Foo");
        assert_eq!(rewritten.as_ref(), b"org/example/shaded/Foo");
        assert_eq!(rewriter.find_residual(&rewritten), None);
    }

    #[rstest]
    fn rewriting_is_deterministic(rewriter: Rewriter) {
        let input = b"Lorg/example/Api; org.example.internal.X";
        assert_eq!(rewriter.rewrite(input), rewriter.rewrite(input));
    }
}
