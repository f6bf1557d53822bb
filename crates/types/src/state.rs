//! State write sets and commit metadata.

use crate::Hash;
use serde::{Deserialize, Serialize};

/// A single key write. `value == None` removes the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl KvPair {
    /// Set `key` to `value`.
    pub fn set(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Remove `key`.
    pub fn remove(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Whether this write removes the key.
    pub fn is_remove(&self) -> bool {
        self.value.is_none()
    }
}

/// All writes made under one actor (store namespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChanges {
    pub actor: Vec<u8>,
    pub changes: Vec<KvPair>,
}

/// The complete write set of one version.
///
/// Actors and keys are sorted so that two nodes producing the same writes
/// produce byte-identical changesets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Changeset {
    pub version: u64,
    pub changes: Vec<StateChanges>,
}

impl Changeset {
    /// Empty changeset for `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            changes: Vec::new(),
        }
    }

    /// Add a single write. Keeps actors in first-seen order; callers that need
    /// canonical ordering build changesets from a sorted source.
    pub fn add(&mut self, actor: &[u8], pair: KvPair) {
        match self.changes.iter_mut().find(|c| c.actor == actor) {
            Some(entry) => entry.changes.push(pair),
            None => self.changes.push(StateChanges {
                actor: actor.to_vec(),
                changes: vec![pair],
            }),
        }
    }

    /// Total number of key writes.
    pub fn len(&self) -> usize {
        self.changes.iter().map(|c| c.changes.len()).sum()
    }

    /// Whether the changeset writes nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Commitment of one actor's store at a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: Vec<u8>,
    pub hash: Hash,
}

/// Per-version metadata proving what was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub version: u64,

    /// Commitments of every actor store, sorted by name.
    pub store_infos: Vec<StoreInfo>,

    /// Root commitment over all store infos.
    pub app_hash: Hash,
}

impl CommitInfo {
    /// Commitment of a single actor store, if it exists at this version.
    pub fn store_hash(&self, name: &[u8]) -> Option<Hash> {
        self.store_infos
            .iter()
            .find(|info| info.name == name)
            .map(|info| info.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_groups_by_actor() {
        let mut changeset = Changeset::new(3);
        changeset.add(b"bank", KvPair::set("alice", "10"));
        changeset.add(b"auth", KvPair::set("alice", "seq"));
        changeset.add(b"bank", KvPair::remove("bob"));

        assert_eq!(changeset.changes.len(), 2);
        assert_eq!(changeset.len(), 3);
        assert_eq!(changeset.changes[0].actor, b"bank".to_vec());
        assert!(changeset.changes[0].changes[1].is_remove());
    }
}
