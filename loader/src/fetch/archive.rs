//! Structural validation of downloaded JAR archives.
//!
//! A downloaded body is only accepted once it opens as a zip archive, holds
//! at least one entry, every entry decompresses with a matching CRC, and no
//! entry name could escape a directory it is extracted into.

use std::io::{self, Cursor, Read, Seek};
use std::path::{Component, Path};

/// Errors arising from archive inspection.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The bytes are not a readable zip archive, or an entry is damaged.
    #[error("unreadable archive: {0}")]
    Unreadable(#[from] zip::result::ZipError),

    /// An entry name attempts to traverse outside the archive root.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending entry name.
        path: String,
    },

    /// The archive contains no entries.
    #[error("archive contains no entries")]
    EmptyArchive,

    /// I/O error reading an archive.
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Validate `bytes` as a non-empty, well-formed JAR and return its entry
/// count.
///
/// # Errors
///
/// Returns [`ArchiveError`] describing the first defect found.
pub fn validate_archive(bytes: &[u8]) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    if archive.is_empty() {
        return Err(ArchiveError::EmptyArchive);
    }
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        validate_entry_name(entry.name())?;
        io::copy(&mut entry, &mut io::sink())?;
    }
    Ok(archive.len())
}

/// Validate that an entry name does not escape the extraction root via
/// `..` components or absolute paths.
pub(crate) fn validate_entry_name(name: &str) -> Result<(), ArchiveError> {
    let traversal = || ArchiveError::PathTraversal {
        path: name.to_owned(),
    };
    if name.starts_with('/') || name.starts_with('\\') || name.contains(':') {
        return Err(traversal());
    }
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(traversal());
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(traversal());
        }
    }
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(traversal());
    }
    Ok(())
}

/// List the fully qualified class names in the JAR at `path` whose package
/// starts with `package_prefix` (dotted form). An empty prefix lists all.
///
/// Inner classes are included; `module-info` and `package-info` are not.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the file cannot be opened or read as a zip.
pub fn list_units(path: &Path, package_prefix: &str) -> Result<Vec<String>, ArchiveError> {
    let file = std::fs::File::open(path)?;
    list_units_in(file, package_prefix)
}

fn list_units_in<R: Read + Seek>(
    reader: R,
    package_prefix: &str,
) -> Result<Vec<String>, ArchiveError> {
    let archive = zip::ZipArchive::new(reader)?;
    let prefix = package_prefix.replace('.', "/");
    let mut units: Vec<String> = archive
        .file_names()
        .filter_map(|name| name.strip_suffix(".class"))
        .filter(|name| !name.starts_with("META-INF/"))
        .filter(|name| !name.ends_with("module-info") && !name.ends_with("package-info"))
        .filter(|name| in_package(name, &prefix))
        .map(|name| name.replace('/', "."))
        .collect();
    units.sort();
    Ok(units)
}

fn in_package(internal_name: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    internal_name
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::JarBuilder;
    use rstest::rstest;

    #[test]
    fn accepts_well_formed_jar() {
        let jar = JarBuilder::new()
            .directory("org/example/")
            .entry("org/example/Foo.class", b"\xca\xfe\xba\xbe")
            .build()
            .expect("jar");
        assert_eq!(validate_archive(&jar).expect("valid"), 2);
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let result = validate_archive(b"<html>502 Bad Gateway</html>");
        assert!(matches!(result, Err(ArchiveError::Unreadable(_))));
    }

    #[test]
    fn rejects_empty_archive() {
        let jar = JarBuilder::new().build().expect("jar");
        assert!(matches!(
            validate_archive(&jar),
            Err(ArchiveError::EmptyArchive)
        ));
    }

    #[test]
    fn rejects_truncated_archive() {
        let jar = JarBuilder::new()
            .entry("a.txt", b"hello")
            .build()
            .expect("jar");
        let truncated = jar.get(..jar.len() / 2).unwrap_or_default();
        assert!(validate_archive(truncated).is_err());
    }

    #[test]
    fn rejects_traversing_entry() {
        let jar = JarBuilder::new()
            .entry("../evil.class", b"x")
            .build()
            .expect("jar");
        assert!(matches!(
            validate_archive(&jar),
            Err(ArchiveError::PathTraversal { .. })
        ));
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    #[case::backslash_parent("foo\\..\\escape.txt")]
    #[case::drive("C:/windows/system32")]
    fn rejects_traversing_names(#[case] name: &str) {
        assert!(
            matches!(
                validate_entry_name(name),
                Err(ArchiveError::PathTraversal { .. })
            ),
            "expected PathTraversal for {name}"
        );
    }

    #[test]
    fn accepts_normal_names() {
        assert!(validate_entry_name("META-INF/versions/9/org/example/Foo.class").is_ok());
    }

    #[test]
    fn lists_units_under_prefix() {
        let jar = JarBuilder::new()
            .entry("org/example/Foo.class", b"x")
            .entry("org/example/Foo$Inner.class", b"x")
            .entry("org/example/package-info.class", b"x")
            .entry("org/examples/Other.class", b"x")
            .entry("org/example/res.txt", b"x")
            .build()
            .expect("jar");
        let units = list_units_in(Cursor::new(jar), "org.example").expect("listing");
        assert_eq!(units, vec!["org.example.Foo", "org.example.Foo$Inner"]);
    }

    #[test]
    fn empty_prefix_lists_everything() {
        let jar = JarBuilder::new()
            .entry("a/A.class", b"x")
            .entry("B.class", b"x")
            .build()
            .expect("jar");
        let units = list_units_in(Cursor::new(jar), "").expect("listing");
        assert_eq!(units, vec!["B", "a.A"]);
    }
}
