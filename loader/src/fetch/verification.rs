//! Verification policy for downloaded artifacts.
//!
//! The policy is a value type: it says which integrity evidence the fetcher
//! looks for and whether unverified bytes are acceptable, without
//! performing any I/O itself.

use std::fmt;

/// Policy governing how a downloaded artifact is verified before caching.
///
/// A caller-supplied descriptor always takes precedence. Without one, the
/// fetcher may consult the checksum files a repository publishes next to
/// the artifact.
///
/// # Examples
///
/// ```
/// use loadstone_loader::fetch::verification::VerificationPolicy;
///
/// let policy = VerificationPolicy::default();
/// assert!(policy.fetch_remote_checksums());
/// assert!(!policy.require_integrity());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    require_integrity: bool,
    fetch_remote_checksums: bool,
}

impl VerificationPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(require_integrity: bool, fetch_remote_checksums: bool) -> Self {
        Self {
            require_integrity,
            fetch_remote_checksums,
        }
    }

    /// Return whether a candidate without any integrity descriptor is
    /// rejected.
    #[must_use]
    pub const fn require_integrity(&self) -> bool {
        self.require_integrity
    }

    /// Return whether repository checksum files are consulted when the
    /// caller supplied no descriptor.
    #[must_use]
    pub const fn fetch_remote_checksums(&self) -> bool {
        self.fetch_remote_checksums
    }
}

impl Default for VerificationPolicy {
    /// Accept unverified artifacts, but use published checksums when found.
    fn default() -> Self {
        Self::new(false, true)
    }
}

impl fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let evidence = if self.fetch_remote_checksums {
            "caller or repository checksums"
        } else {
            "caller checksums only"
        };
        if self.require_integrity {
            write!(f, "integrity required ({evidence})")
        } else {
            write!(f, "integrity optional ({evidence})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default(
        VerificationPolicy::default(),
        "integrity optional (caller or repository checksums)"
    )]
    #[case::strict(
        VerificationPolicy::new(true, false),
        "integrity required (caller checksums only)"
    )]
    fn display_describes_policy(#[case] policy: VerificationPolicy, #[case] expected: &str) {
        assert_eq!(policy.to_string(), expected);
    }
}
