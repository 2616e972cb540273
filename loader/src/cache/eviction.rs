//! Size-bounded, least-recently-used cache eviction.

use super::CacheError;
use super::store::{CacheStore, EntryUsage};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Limit on the total size of the cache.
///
/// # Examples
///
/// ```
/// use loadstone_loader::cache::EvictionPolicy;
///
/// assert_eq!(EvictionPolicy::default().max_bytes(), None);
/// assert_eq!(EvictionPolicy::bounded(1024).max_bytes(), Some(1024));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    max_bytes: Option<u64>,
}

impl EvictionPolicy {
    /// Never evict.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { max_bytes: None }
    }

    /// Keep the cache at or below `max_bytes`.
    #[must_use]
    pub const fn bounded(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
        }
    }

    /// The configured limit, if any.
    #[must_use]
    pub const fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }
}

/// What an eviction pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entry directories removed, oldest family first, relative to the
    /// cache root.
    pub evicted: Vec<Utf8PathBuf>,
    /// Bytes released.
    pub freed_bytes: u64,
    /// Bytes still held after the pass.
    pub remaining_bytes: u64,
}

/// Entries of one artifact variant: the raw archive and every relocated
/// archive derived from it. A relocated hit needs its raw entry, so the
/// family is aged and evicted as one unit.
#[derive(Debug, Default)]
struct Family {
    members: Vec<EntryUsage>,
    last_used: Option<SystemTime>,
}

impl Family {
    fn add(&mut self, usage: EntryUsage) {
        self.last_used = self.last_used.max(Some(usage.last_used));
        self.members.push(usage);
    }
}

/// `group/artifact/version/<variant>` for an entry directory.
fn family_of(relative_dir: &Utf8Path) -> Utf8PathBuf {
    let name = relative_dir.file_name().unwrap_or_default();
    let variant = name
        .strip_suffix(RAW_SUFFIX)
        .or_else(|| name.rsplit_once(RELOCATED_INFIX).map(|(variant, _)| variant))
        .unwrap_or(name);
    relative_dir.with_file_name(variant)
}

const RAW_SUFFIX: &str = "-raw";
const RELOCATED_INFIX: &str = "-relocated-";

/// Remove least-recently-used entries until the cache fits `policy`.
///
/// Entries are grouped per artifact variant, so a raw archive and the
/// relocated archives built from it leave together. A family with any
/// member in `protected` (entry directories relative to the cache root) is
/// never removed, so the limit may still be exceeded when protected
/// families alone are larger.
///
/// # Errors
///
/// Returns [`CacheError`] if the cache cannot be listed or an entry cannot
/// be removed.
pub fn enforce(
    store: &CacheStore,
    policy: EvictionPolicy,
    protected: &[Utf8PathBuf],
) -> Result<EvictionReport, CacheError> {
    let Some(limit) = policy.max_bytes() else {
        return Ok(EvictionReport::default());
    };

    let entries = store.entries()?;
    let mut total: u64 = entries.iter().map(|entry| entry.size).sum();
    let mut report = EvictionReport::default();
    if total <= limit {
        report.remaining_bytes = total;
        return Ok(report);
    }

    let mut families: BTreeMap<Utf8PathBuf, Family> = BTreeMap::new();
    for entry in entries {
        families
            .entry(family_of(&entry.relative_dir))
            .or_default()
            .add(entry);
    }
    let mut families: Vec<(Utf8PathBuf, Family)> = families.into_iter().collect();
    families.sort_by(|(a_name, a), (b_name, b)| {
        a.last_used
            .cmp(&b.last_used)
            .then_with(|| a_name.cmp(b_name))
    });

    for (name, mut family) in families {
        if total <= limit {
            break;
        }
        if family
            .members
            .iter()
            .any(|member| protected.contains(&member.relative_dir))
        {
            debug!(target: "loadstone::cache", "keeping {name} (in use)");
            continue;
        }
        // Derived entries first, so a raw archive never disappears under a
        // relocated one that is still listed.
        family
            .members
            .sort_by_key(|member| member.relative_dir.as_str().ends_with(RAW_SUFFIX));
        for member in family.members {
            if store.evict_relative(&member.relative_dir)? {
                total = total.saturating_sub(member.size);
                report.freed_bytes = report.freed_bytes.saturating_add(member.size);
                report.evicted.push(member.relative_dir);
            }
        }
    }

    report.remaining_bytes = total;
    if !report.evicted.is_empty() {
        info!(
            target: "loadstone::cache",
            "evicted {} cache entries ({} bytes), {} bytes remain",
            report.evicted.len(),
            report.freed_bytes,
            report.remaining_bytes
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::CacheKey;
    use crate::cache::store::LAST_USED_FILE;
    use rstest::rstest;
    use loadstone_common::coordinate::Coordinate;
    use std::time::{Duration, SystemTime};

    fn coordinate(version: &str) -> Coordinate {
        Coordinate::builder()
            .group("org.example")
            .artifact("foo")
            .version(version)
            .build()
            .expect("coordinate")
    }

    fn open_store(temp: &tempfile::TempDir) -> CacheStore {
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 path");
        CacheStore::open(root).expect("open cache")
    }

    fn stamp(store: &CacheStore, key: &CacheKey, age_secs: u64) {
        let file = std::fs::File::options()
            .write(true)
            .open(store.entry_dir(key).join(LAST_USED_FILE))
            .expect("open stamp");
        let when = SystemTime::now()
            .checked_sub(Duration::from_secs(age_secs))
            .expect("representable time");
        file.set_modified(when).expect("set mtime");
    }

    fn seed(store: &CacheStore, versions: &[(&str, u64)]) -> Vec<CacheKey> {
        versions
            .iter()
            .map(|(version, age)| {
                let key = CacheKey::raw(&coordinate(version));
                store
                    .store(&key, &[0_u8; 1000], "label", None)
                    .expect("store");
                stamp(store, &key, *age);
                key
            })
            .collect()
    }

    #[test]
    fn unbounded_policy_keeps_everything() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = open_store(&temp);
        seed(&store, &[("1", 10), ("2", 20)]);
        let report = enforce(&store, EvictionPolicy::unbounded(), &[]).expect("enforce");
        assert!(report.evicted.is_empty());
        assert_eq!(store.entries().expect("entries").len(), 2);
    }

    #[test]
    fn oldest_entries_go_first() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = open_store(&temp);
        let keys = seed(&store, &[("1", 300), ("2", 200), ("3", 100)]);
        let per_entry = store
            .entries()
            .expect("entries")
            .first()
            .map(|entry| entry.size)
            .expect("an entry");

        let policy = EvictionPolicy::bounded(per_entry * 2);
        let report = enforce(&store, policy, &[]).expect("enforce");

        let oldest = keys.first().expect("seeded").relative_dir();
        assert_eq!(report.evicted, vec![oldest]);
        assert_eq!(store.entries().expect("entries").len(), 2);
        assert!(report.remaining_bytes <= per_entry * 2);
    }

    #[test]
    fn protected_entries_survive() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = open_store(&temp);
        let keys = seed(&store, &[("1", 300), ("2", 200)]);
        let oldest = keys.first().expect("seeded").clone();

        let report = enforce(&store, EvictionPolicy::bounded(0), &[oldest.relative_dir()])
            .expect("enforce");

        assert_eq!(report.evicted.len(), 1);
        assert!(store.entry_dir(&oldest).exists());
    }

    fn relocated_coordinate(version: &str) -> Coordinate {
        Coordinate::builder()
            .group("org.example")
            .artifact("foo")
            .version(version)
            .relocate("org.example", "shaded.example")
            .build()
            .expect("coordinate")
    }

    /// Store a raw entry and a relocated entry built from it.
    fn seed_family(
        store: &CacheStore,
        version: &str,
        raw_age: u64,
        relocated_age: u64,
    ) -> (CacheKey, CacheKey) {
        let coordinate = relocated_coordinate(version);
        let raw = CacheKey::raw(&coordinate);
        let stored = store
            .store(&raw, &[0_u8; 1000], "label", None)
            .expect("store raw");
        let relocated = CacheKey::for_rules(&coordinate);
        store
            .store(&relocated, &[1_u8; 1000], "label", Some(stored.sha256()))
            .expect("store relocated");
        stamp(store, &raw, raw_age);
        stamp(store, &relocated, relocated_age);
        (raw, relocated)
    }

    #[test]
    fn raw_and_relocated_entries_leave_together() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = open_store(&temp);
        let (raw, relocated) = seed_family(&store, "1", 300, 290);
        let relocated_size = store
            .entries()
            .expect("entries")
            .iter()
            .find(|entry| entry.relative_dir == relocated.relative_dir())
            .map(|entry| entry.size)
            .expect("relocated entry");

        let report =
            enforce(&store, EvictionPolicy::bounded(relocated_size), &[]).expect("enforce");

        assert_eq!(report.evicted, vec![relocated.relative_dir(), raw.relative_dir()]);
        assert!(store.entries().expect("entries").is_empty());
    }

    #[test]
    fn family_age_follows_its_most_recent_member() {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = open_store(&temp);
        let (raw, relocated) = seed_family(&store, "1", 300, 10);
        let older = seed(&store, &[("2", 200)]);
        let older = older.first().expect("seeded");
        let total: u64 = store
            .entries()
            .expect("entries")
            .iter()
            .map(|entry| entry.size)
            .sum();

        let report = enforce(&store, EvictionPolicy::bounded(total - 1), &[]).expect("enforce");

        assert_eq!(report.evicted, vec![older.relative_dir()]);
        assert!(store.entry_dir(&raw).exists());
        assert!(store.entry_dir(&relocated).exists());
    }

    #[rstest]
    #[case::raw_member(false)]
    #[case::relocated_member(true)]
    fn protecting_one_member_keeps_the_family(#[case] protect_relocated: bool) {
        let temp = tempfile::tempdir().expect("temp dir");
        let store = open_store(&temp);
        let (raw, relocated) = seed_family(&store, "1", 300, 300);
        let protected = if protect_relocated { &relocated } else { &raw };

        let report = enforce(&store, EvictionPolicy::bounded(0), &[protected.relative_dir()])
            .expect("enforce");

        assert!(report.evicted.is_empty());
        assert!(store.entry_dir(&raw).exists());
        assert!(store.entry_dir(&relocated).exists());
    }

    #[rstest]
    #[case::raw("org.example/foo/1.0/default-raw", "org.example/foo/1.0/default")]
    #[case::relocated(
        "org.example/foo/1.0/default-relocated-0123456789abcdef",
        "org.example/foo/1.0/default"
    )]
    #[case::classifier_variant("org.example/foo/1.0/sources-raw", "org.example/foo/1.0/sources")]
    fn entries_group_by_variant(#[case] entry: &str, #[case] family: &str) {
        assert_eq!(family_of(Utf8Path::new(entry)), Utf8PathBuf::from(family));
    }
}
