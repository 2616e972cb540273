//! Cache entry lookup, commit and removal.

use super::CacheError;
use super::key::CacheKey;
use super::sidecar::{EntrySidecar, SIDECAR_FILE};
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use loadstone_common::digest::{IntegrityDescriptor, Sha256Digest};
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

/// Directory under the cache root holding per-entry lock files.
const LOCK_DIR: &str = ".locks";
/// `group/artifact/version/entry`.
const ENTRY_DEPTH: usize = 4;

/// LRU stamp file inside an entry directory.
pub(crate) const LAST_USED_FILE: &str = "last-used";

/// What a cache entry must satisfy to count as a hit.
#[derive(Debug, Clone, Copy)]
pub enum EntryCheck<'a> {
    /// A downloaded artifact, optionally pinned by the caller's digest.
    Raw {
        /// Digest the cached bytes must match, if any.
        integrity: Option<&'a IntegrityDescriptor>,
    },
    /// A relocated artifact built from the raw archive with this hash.
    Relocated {
        /// Hash of the raw archive the entry must derive from.
        source: &'a Sha256Digest,
    },
}

/// A complete, verified cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    key: CacheKey,
    path: Utf8PathBuf,
    sha256: Sha256Digest,
    size: u64,
}

impl CachedArtifact {
    /// Key of the entry.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Path of the archive file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Content hash of the archive.
    #[must_use]
    pub fn sha256(&self) -> &Sha256Digest {
        &self.sha256
    }

    /// Archive size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the archive bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] if the file cannot be read.
    pub fn read(&self) -> Result<Vec<u8>, CacheError> {
        fs::read(&self.path).map_err(|source| CacheError::Read {
            path: self.path.clone(),
            source,
        })
    }
}

/// Size and recency of one entry, used for eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryUsage {
    /// Entry directory relative to the cache root.
    pub relative_dir: Utf8PathBuf,
    /// Total bytes of the files in the entry.
    pub size: u64,
    /// Last time the entry was stored or hit.
    pub last_used: SystemTime,
}

enum Inspection {
    Missing,
    /// Damaged or incomplete; safe to remove.
    Invalid(&'static str),
    /// Intact, but not what the caller asked for.
    Mismatch(&'static str),
    Valid(CachedArtifact),
}

/// The on-disk cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Utf8PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) the cache at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] when the directory cannot be
    /// created.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        let locks = root.join(LOCK_DIR);
        fs::create_dir_all(&locks).map_err(|source| CacheError::Unavailable {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory of the entry for `key`.
    #[must_use]
    pub fn entry_dir(&self, key: &CacheKey) -> Utf8PathBuf {
        self.root.join(key.relative_dir())
    }

    /// Entry directory, relative to the root, holding the archive at
    /// `archive`. `None` for paths outside this cache.
    #[must_use]
    pub fn entry_of(&self, archive: &Path) -> Option<Utf8PathBuf> {
        let entry = Utf8Path::from_path(archive)?.parent()?;
        let relative = entry.strip_prefix(&self.root).ok()?;
        (relative.components().count() == ENTRY_DEPTH).then(|| relative.to_owned())
    }

    /// Return the verified entry for `key`, if any.
    ///
    /// The archive is rehashed and compared with its sidecar and with
    /// `check`. A damaged entry is evicted under the key lock and reported
    /// as a miss. An intact entry that fails `check` is a miss but stays in
    /// place; only [`CacheStore::store`] with freshly verified bytes
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on I/O failures other than absence.
    pub fn lookup(
        &self,
        key: &CacheKey,
        check: EntryCheck<'_>,
    ) -> Result<Option<CachedArtifact>, CacheError> {
        match self.inspect(key, check)? {
            Inspection::Missing => Ok(None),
            Inspection::Mismatch(reason) => {
                debug!(target: "loadstone::cache", "skipping {key}: {reason}");
                Ok(None)
            }
            Inspection::Valid(artifact) => {
                self.touch(key);
                Ok(Some(artifact))
            }
            Inspection::Invalid(_) => {
                let _lock = self.lock(&key.relative_dir())?;
                match self.inspect(key, check)? {
                    Inspection::Missing | Inspection::Mismatch(_) => Ok(None),
                    Inspection::Valid(artifact) => {
                        self.touch(key);
                        Ok(Some(artifact))
                    }
                    Inspection::Invalid(reason) => {
                        warn!(target: "loadstone::cache", "evicting {key}: {reason}");
                        remove_dir(&self.entry_dir(key))?;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Commit `bytes` as the entry for `key`.
    ///
    /// Runs under the key lock. If the entry already holds exactly `bytes`
    /// (another writer got there first), that entry is returned. An entry
    /// holding different content is replaced wholesale: its sidecar is
    /// removed first, then the archive and a new sidecar are renamed into
    /// place, so readers never observe a sidecar without its archive.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the lock, a write, or a rename fails.
    pub fn store(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        label: &str,
        source_sha256: Option<&Sha256Digest>,
    ) -> Result<CachedArtifact, CacheError> {
        let relative = key.relative_dir();
        let _lock = self.lock(&relative)?;

        let sha256 = Sha256Digest::of(bytes);
        let check = match source_sha256 {
            Some(source) => EntryCheck::Relocated { source },
            None => EntryCheck::Raw { integrity: None },
        };
        let dir = self.entry_dir(key);
        match self.inspect(key, check)? {
            Inspection::Valid(existing) if existing.sha256() == &sha256 => {
                debug!(target: "loadstone::cache", "{key} was committed concurrently");
                self.touch(key);
                return Ok(existing);
            }
            Inspection::Missing => {}
            Inspection::Valid(_) | Inspection::Mismatch(_) | Inspection::Invalid(_) => {
                info!(target: "loadstone::cache", "replacing {key} with new content");
                remove_file(&dir.join(SIDECAR_FILE))?;
            }
        }

        fs::create_dir_all(&dir).map_err(|source| CacheError::Write {
            path: dir.clone(),
            source,
        })?;

        let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        let path = dir.join(key.file_name());
        write_atomically(&dir, &path, bytes)?;

        let sidecar = EntrySidecar::new(
            label,
            &key.fingerprint().segment(),
            &key.file_name(),
            sha256.clone(),
            size,
            source_sha256.cloned(),
        );
        let json = sidecar
            .to_json()
            .map_err(|source| CacheError::Serialize { source })?;
        write_atomically(&dir, &dir.join(SIDECAR_FILE), json.as_bytes())?;
        self.touch(key);
        debug!(target: "loadstone::cache", "committed {key} ({size} bytes)");

        Ok(CachedArtifact {
            key: key.clone(),
            path,
            sha256,
            size,
        })
    }

    /// Remove the entry for `key` if present. Returns true when removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the lock or the removal fails.
    pub fn evict(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.evict_relative(&key.relative_dir())
    }

    pub(crate) fn evict_relative(&self, relative: &Utf8Path) -> Result<bool, CacheError> {
        let _lock = self.lock(relative)?;
        let dir = self.root.join(relative);
        if !dir.exists() {
            return Ok(false);
        }
        remove_dir(&dir)?;
        Ok(true)
    }

    /// List every complete entry with its size and last use.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] if a directory cannot be listed.
    pub fn entries(&self) -> Result<Vec<EntryUsage>, CacheError> {
        let mut usages = Vec::new();
        for group in child_dirs(&self.root)? {
            if group.file_name() == Some(LOCK_DIR) {
                continue;
            }
            for artifact in child_dirs(&group)? {
                for version in child_dirs(&artifact)? {
                    for entry in child_dirs(&version)? {
                        if let Some(usage) = self.usage(&entry)? {
                            usages.push(usage);
                        }
                    }
                }
            }
        }
        Ok(usages)
    }

    fn usage(&self, entry: &Utf8Path) -> Result<Option<EntryUsage>, CacheError> {
        let sidecar = entry.join(SIDECAR_FILE);
        if !sidecar.is_file() {
            return Ok(None);
        }
        let Ok(relative) = entry.strip_prefix(&self.root) else {
            return Ok(None);
        };
        let mut size = 0_u64;
        for file in read_dir(entry)? {
            if let Ok(metadata) = file.metadata() {
                size = size.saturating_add(metadata.len());
            }
        }
        let last_used = fs::metadata(entry.join(LAST_USED_FILE))
            .or_else(|_| fs::metadata(&sidecar))
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(Some(EntryUsage {
            relative_dir: relative.to_owned(),
            size,
            last_used,
        }))
    }

    fn inspect(&self, key: &CacheKey, check: EntryCheck<'_>) -> Result<Inspection, CacheError> {
        let dir = self.entry_dir(key);
        let sidecar_path = dir.join(SIDECAR_FILE);
        let text = match fs::read_to_string(&sidecar_path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Inspection::Missing);
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: sidecar_path,
                    source,
                });
            }
        };
        let Ok(sidecar) = EntrySidecar::from_json(&text) else {
            return Ok(Inspection::Invalid("unreadable sidecar"));
        };
        if !sidecar.is_current() {
            return Ok(Inspection::Invalid("unsupported sidecar schema"));
        }

        let path = dir.join(key.file_name());
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Inspection::Invalid("archive missing"));
            }
            Err(source) => return Err(CacheError::Read { path, source }),
        };
        let actual = Sha256Digest::of(&bytes);
        if &actual != sidecar.sha256() {
            return Ok(Inspection::Invalid("content hash does not match sidecar"));
        }

        match check {
            EntryCheck::Raw {
                integrity: Some(descriptor),
            } => {
                let matches = descriptor
                    .matches_sha256(&actual)
                    .unwrap_or_else(|| descriptor.verify(&bytes).is_ok());
                if !matches {
                    return Ok(Inspection::Mismatch("content does not match requested digest"));
                }
            }
            EntryCheck::Raw { integrity: None } => {}
            EntryCheck::Relocated { source } => {
                if sidecar.source_sha256() != Some(source) {
                    return Ok(Inspection::Mismatch("built from a different raw artifact"));
                }
            }
        }

        Ok(Inspection::Valid(CachedArtifact {
            key: key.clone(),
            path,
            sha256: actual,
            size: sidecar.size(),
        }))
    }

    fn lock(&self, relative: &Utf8Path) -> Result<EntryLock, CacheError> {
        let dir = self.root.join(LOCK_DIR);
        let name: String = relative
            .as_str()
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '+' } else { c })
            .collect();
        let path = dir.join(format!("{name}.lock"));
        let lock_error = |source| CacheError::Lock {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(lock_error)?;
        let file = fs::File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_error)?;
        FileExt::lock_exclusive(&file).map_err(lock_error)?;
        Ok(EntryLock { file })
    }

    fn touch(&self, key: &CacheKey) {
        let stamp = self.entry_dir(key).join(LAST_USED_FILE);
        let result = fs::File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&stamp)
            .and_then(|file| file.set_modified(SystemTime::now()));
        if let Err(error) = result {
            debug!(target: "loadstone::cache", "could not stamp {stamp}: {error}");
        }
    }
}

/// Exclusive per-key lock, released on drop.
struct EntryLock {
    file: fs::File,
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            debug!(target: "loadstone::cache", "failed to release cache lock: {error}");
        }
    }
}

fn remove_dir(dir: &Utf8Path) -> Result<(), CacheError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Evict {
            path: dir.to_owned(),
            source,
        }),
    }
}

fn remove_file(path: &Utf8Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Evict {
            path: path.to_owned(),
            source,
        }),
    }
}

fn write_atomically(dir: &Utf8Path, path: &Utf8Path, bytes: &[u8]) -> Result<(), CacheError> {
    let write_error = |source| CacheError::Write {
        path: path.to_owned(),
        source,
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(bytes).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(path).map_err(|error| write_error(error.error))?;
    Ok(())
}

fn read_dir(dir: &Utf8Path) -> Result<Vec<fs::DirEntry>, CacheError> {
    let read_error = |source| CacheError::Read {
        path: dir.to_owned(),
        source,
    };
    fs::read_dir(dir)
        .map_err(read_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)
}

fn child_dirs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CacheError> {
    let mut dirs: Vec<Utf8PathBuf> = read_dir(dir)?
        .into_iter()
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .collect();
    dirs.sort();
    Ok(dirs)
}
