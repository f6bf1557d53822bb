//! Versioned key/value storage.

use crate::{StateSnapshot, StoreError};
use cadence_types::{Changeset, CommitInfo};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// The commit/read interface the consensus driver needs from storage.
///
/// Versions are written contiguously, one per committed block. The first
/// write to an empty store may use any version (genesis is written at
/// `initial_height - 1`).
pub trait VersionedStore: Send + Sync + 'static {
    /// Latest committed version, or 0 for an empty store.
    fn latest_version(&self) -> u64;

    /// Commit a changeset as `changeset.version`.
    fn write_changeset(&self, changeset: &Changeset) -> Result<CommitInfo, StoreError>;

    /// Metadata for a committed version.
    fn commit_info(&self, version: u64) -> Result<CommitInfo, StoreError>;

    /// Full state at a committed version.
    ///
    /// An empty store returns the empty state for version 0.
    fn snapshot(&self, version: u64) -> Result<StateSnapshot, StoreError>;

    /// State at the latest version.
    fn latest_snapshot(&self) -> Result<StateSnapshot, StoreError> {
        self.snapshot(self.latest_version())
    }

    /// Read a single key at a version. Missing keys are `Ok(None)`.
    fn get(&self, actor: &[u8], key: &[u8], version: u64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.snapshot(version)?.get(actor, key).cloned())
    }

    /// Whether anything has been committed yet.
    fn is_empty(&self) -> bool {
        self.commit_info(self.latest_version()).is_err()
    }

    /// Drop every version below `retain_height`, keeping at least the latest.
    ///
    /// Returns the number of versions removed.
    fn prune(&self, retain_height: u64) -> usize;
}

#[derive(Debug)]
struct VersionEntry {
    snapshot: StateSnapshot,
    commit_info: CommitInfo,
}

/// In-memory versioned store.
///
/// Every committed version is kept as a persistent-map snapshot, so reading
/// historical versions and branching off the latest one are both cheap.
#[derive(Debug, Default)]
pub struct MemoryStore {
    versions: RwLock<BTreeMap<u64, VersionEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions held.
    pub fn version_count(&self) -> usize {
        self.versions.read().len()
    }
}

impl VersionedStore for MemoryStore {
    fn latest_version(&self) -> u64 {
        self.versions
            .read()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    fn write_changeset(&self, changeset: &Changeset) -> Result<CommitInfo, StoreError> {
        let mut versions = self.versions.write();

        let base = match versions.iter().next_back() {
            Some((&latest, entry)) => {
                let expected = latest + 1;
                if changeset.version != expected {
                    return Err(StoreError::NonContiguousVersion {
                        expected,
                        got: changeset.version,
                    });
                }
                entry.snapshot.clone()
            }
            None => StateSnapshot::empty(),
        };

        let snapshot = base.apply(changeset);
        let commit_info = snapshot.commit_info();
        debug!(
            version = changeset.version,
            writes = changeset.len(),
            app_hash = %commit_info.app_hash,
            "Committed changeset"
        );

        versions.insert(
            changeset.version,
            VersionEntry {
                snapshot,
                commit_info: commit_info.clone(),
            },
        );
        Ok(commit_info)
    }

    fn commit_info(&self, version: u64) -> Result<CommitInfo, StoreError> {
        self.versions
            .read()
            .get(&version)
            .map(|entry| entry.commit_info.clone())
            .ok_or(StoreError::VersionNotFound(version))
    }

    fn snapshot(&self, version: u64) -> Result<StateSnapshot, StoreError> {
        let versions = self.versions.read();
        match versions.get(&version) {
            Some(entry) => Ok(entry.snapshot.clone()),
            None if versions.is_empty() && version == 0 => Ok(StateSnapshot::empty()),
            None => Err(StoreError::VersionNotFound(version)),
        }
    }

    fn prune(&self, retain_height: u64) -> usize {
        let mut versions = self.versions.write();
        let latest = versions.keys().next_back().copied().unwrap_or(0);
        let cutoff = retain_height.min(latest);
        let before = versions.len();
        versions.retain(|version, _| *version >= cutoff);
        let removed = before - versions.len();
        if removed > 0 {
            debug!(removed, retain_height = cutoff, "Pruned store versions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::KvPair;
    use tracing_test::traced_test;

    fn changeset(version: u64, key: &str, value: &str) -> Changeset {
        let mut cs = Changeset::new(version);
        cs.add(b"cookies", KvPair::set(key, value));
        cs
    }

    #[traced_test]
    #[test]
    fn test_empty_store() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_version(), 0);
        assert!(store.is_empty());
        assert_eq!(store.commit_info(0), Err(StoreError::VersionNotFound(0)));
        assert_eq!(store.snapshot(0).unwrap(), StateSnapshot::empty());
        assert!(store.snapshot(1).is_err());
    }

    #[traced_test]
    #[test]
    fn test_first_write_may_use_any_version() {
        let store = MemoryStore::new();
        let info = store.write_changeset(&changeset(1, "key", "value")).unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(store.latest_version(), 1);
        assert!(!store.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_versions_are_contiguous() {
        let store = MemoryStore::new();
        store.write_changeset(&changeset(0, "a", "1")).unwrap();
        store.write_changeset(&changeset(1, "a", "2")).unwrap();

        assert_eq!(
            store.write_changeset(&changeset(3, "a", "3")),
            Err(StoreError::NonContiguousVersion {
                expected: 2,
                got: 3
            })
        );
        assert_eq!(
            store.write_changeset(&changeset(1, "a", "3")),
            Err(StoreError::NonContiguousVersion {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(store.latest_version(), 1);
    }

    #[traced_test]
    #[test]
    fn test_historical_reads() {
        let store = MemoryStore::new();
        store.write_changeset(&changeset(1, "key", "old")).unwrap();
        store.write_changeset(&changeset(2, "key", "new")).unwrap();

        assert_eq!(store.get(b"cookies", b"key", 1).unwrap(), Some(b"old".to_vec()));
        assert_eq!(store.get(b"cookies", b"key", 2).unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.get(b"cookies", b"missing", 2).unwrap(), None);
        assert_eq!(store.commit_info(2).unwrap().version, 2);
        assert_ne!(
            store.commit_info(1).unwrap().app_hash,
            store.commit_info(2).unwrap().app_hash
        );
    }

    #[traced_test]
    #[test]
    fn test_prune_keeps_latest() {
        let store = MemoryStore::new();
        for version in 1..=5 {
            store
                .write_changeset(&changeset(version, "k", &version.to_string()))
                .unwrap();
        }

        assert_eq!(store.prune(4), 3);
        assert_eq!(store.version_count(), 2);
        assert!(store.snapshot(3).is_err());
        assert_eq!(store.prune(100), 1);
        assert_eq!(store.latest_version(), 5);
    }
}
