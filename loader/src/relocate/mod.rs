//! Namespace relocation of JAR archives.
//!
//! [`relocate`] rewrites an archive so that every reference to a source
//! package prefix points at its target prefix instead: entry paths, class
//! constant pools, service registrations and text resources. The transform
//! is pure and deterministic, and an empty rule set returns the input
//! unchanged.

pub mod class_file;
pub mod matcher;

use class_file::ClassFileError;
use loadstone_common::relocation::RelocationSet;
use log::debug;
use matcher::Rewriter;
use std::collections::HashSet;
use std::io::{self, Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const SERVICES_DIR: &str = "META-INF/services/";
const VERSIONS_DIR: &str = "META-INF/versions/";
const SIGNATURE_EXTENSIONS: [&str; 4] = [".SF", ".RSA", ".DSA", ".EC"];

/// Errors arising from relocation.
#[derive(Debug, thiserror::Error)]
pub enum RelocationError {
    /// The input is not a readable zip archive.
    #[error("cannot read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Reading or writing entry data failed.
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),

    /// A class file could not be parsed or re-encoded.
    #[error("cannot relocate {entry}: {source}")]
    ClassFile {
        /// Entry name of the class.
        entry: String,
        /// Underlying class-file error.
        #[source]
        source: ClassFileError,
    },

    /// Two entries map to the same relocated name.
    #[error("relocated entry {name} would be written twice")]
    EntryCollision {
        /// The colliding output name.
        name: String,
    },

    /// A relocated class still references a source prefix.
    #[error("{entry} still references {prefix} after relocation")]
    ResidualReference {
        /// Entry name of the class.
        entry: String,
        /// The surviving source prefix.
        prefix: String,
    },
}

/// Relocate the JAR in `bytes` according to `rules`.
///
/// # Errors
///
/// Returns [`RelocationError`] for unreadable archives, malformed classes,
/// colliding output names, and rewrites that leave dangling references.
pub fn relocate(bytes: &[u8], rules: &RelocationSet) -> Result<Vec<u8>, RelocationError> {
    if rules.is_empty() {
        return Ok(bytes.to_vec());
    }
    let rewriter = Rewriter::new(rules);
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(bytes.len())));
    let mut written = HashSet::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_owned();
        if is_signature_file(&name) {
            debug!(target: "loadstone::relocate", "dropping signature file {name}");
            continue;
        }

        let relocated_name = relocate_entry_name(&name, &rewriter);
        if !written.insert(relocated_name.clone()) {
            return Err(RelocationError::EntryCollision {
                name: relocated_name,
            });
        }

        let mut options = SimpleFileOptions::default()
            .compression_method(output_method(entry.compression()))
            .last_modified_time(DateTime::default());
        if let Some(mode) = entry.unix_mode() {
            options = options.unix_permissions(mode);
        }

        if entry.is_dir() {
            writer.add_directory(relocated_name, options)?;
            continue;
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        let data = relocate_entry_data(&name, data, &rewriter)?;
        writer.start_file(relocated_name, options)?;
        writer.write_all(&data)?;
    }

    Ok(writer.finish()?.into_inner())
}

fn relocate_entry_name(name: &str, rewriter: &Rewriter) -> String {
    if let Some(service) = name.strip_prefix(SERVICES_DIR) {
        return format!("{SERVICES_DIR}{}", rewriter.rewrite_dotted(service));
    }
    if let Some(versioned) = name.strip_prefix(VERSIONS_DIR) {
        if let Some((release, rest)) = versioned.split_once('/') {
            return format!("{VERSIONS_DIR}{release}/{}", rewriter.rewrite_path(rest));
        }
    }
    rewriter.rewrite_path(name)
}

fn relocate_entry_data(
    name: &str,
    data: Vec<u8>,
    rewriter: &Rewriter,
) -> Result<Vec<u8>, RelocationError> {
    if name.ends_with(".class") {
        return class_file::rewrite_class(&data, rewriter).map_err(|source| match source {
            ClassFileError::Residual { prefix, .. } => RelocationError::ResidualReference {
                entry: name.to_owned(),
                prefix,
            },
            other => RelocationError::ClassFile {
                entry: name.to_owned(),
                source: other,
            },
        });
    }
    if std::str::from_utf8(&data).is_ok() && !data.contains(&0) {
        return Ok(rewriter.rewrite(&data).into_owned());
    }
    Ok(data)
}

fn output_method(input: CompressionMethod) -> CompressionMethod {
    if input == CompressionMethod::Stored {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    }
}

fn is_signature_file(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    !file.contains('/')
        && SIGNATURE_EXTENSIONS
            .iter()
            .any(|extension| file.to_ascii_uppercase().ends_with(extension))
}
