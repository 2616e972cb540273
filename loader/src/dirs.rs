//! Directory resolution abstraction for platform-specific paths.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Environment variable that overrides the cache root.
pub const CACHE_DIR_ENV: &str = "LOADSTONE_CACHE_DIR";

/// Source of platform base directories, mockable in tests.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Per-user cache directory for loadstone, if the platform has one.
    fn cache_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
#[derive(Debug, Clone, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn cache_dir(&self) -> Option<PathBuf> {
        directories_next::ProjectDirs::from("dev", "loadstone", "loadstone")
            .map(|dirs| dirs.cache_dir().to_path_buf())
    }
}

/// Resolve the cache root: `LOADSTONE_CACHE_DIR` when set and non-empty,
/// otherwise the platform cache directory. Non-UTF-8 paths are ignored.
#[must_use]
pub fn default_cache_dir(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    let from_env = std::env::var(CACHE_DIR_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from);
    from_env.or_else(|| {
        dirs.cache_dir()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_cache_dir().never();
        temp_env::with_var(CACHE_DIR_ENV, Some("/tmp/loadstone-cache"), || {
            assert_eq!(
                default_cache_dir(&dirs),
                Some(Utf8PathBuf::from("/tmp/loadstone-cache"))
            );
        });
    }

    #[test]
    fn falls_back_to_platform_cache_dir() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_cache_dir()
            .returning(|| Some(PathBuf::from("/home/user/.cache/loadstone")));
        temp_env::with_var_unset(CACHE_DIR_ENV, || {
            assert_eq!(
                default_cache_dir(&dirs),
                Some(Utf8PathBuf::from("/home/user/.cache/loadstone"))
            );
        });
    }

    #[test]
    fn blank_override_is_ignored() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_cache_dir().returning(|| None);
        temp_env::with_var(CACHE_DIR_ENV, Some("  "), || {
            assert_eq!(default_cache_dir(&dirs), None);
        });
    }
}
