//! Immutable state snapshots with O(1) cloning.
//!
//! A [`StateSnapshot`] is the full key/value state of one committed version,
//! stored in persistent `im` maps so branching a new execution off a version
//! costs a reference count bump rather than a copy.

use cadence_types::{Changeset, CommitInfo, Hash, StoreInfo};

/// Key/value contents of one actor store.
pub type ActorStore = im::OrdMap<Vec<u8>, Vec<u8>>;

/// Full state of one version, keyed by actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    version: u64,
    actors: im::OrdMap<Vec<u8>, ActorStore>,
}

impl StateSnapshot {
    /// Empty state at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Version this snapshot represents.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Read a value.
    pub fn get(&self, actor: &[u8], key: &[u8]) -> Option<&Vec<u8>> {
        self.actors.get(actor)?.get(key)
    }

    /// Number of actors with at least one key.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Produce the snapshot that results from applying `changeset`.
    ///
    /// Actors left without keys are dropped so equal contents always hash
    /// equally, whatever history produced them.
    pub fn apply(&self, changeset: &Changeset) -> StateSnapshot {
        let mut actors = self.actors.clone();
        for state_changes in &changeset.changes {
            let mut store = actors
                .get(state_changes.actor.as_slice())
                .cloned()
                .unwrap_or_default();
            for pair in &state_changes.changes {
                match &pair.value {
                    Some(value) => {
                        store.insert(pair.key.clone(), value.clone());
                    }
                    None => {
                        store.remove(pair.key.as_slice());
                    }
                }
            }
            if store.is_empty() {
                actors.remove(state_changes.actor.as_slice());
            } else {
                actors.insert(state_changes.actor.clone(), store);
            }
        }

        StateSnapshot {
            version: changeset.version,
            actors,
        }
    }

    /// Commitments of every actor store, sorted by actor name.
    pub fn store_infos(&self) -> Vec<StoreInfo> {
        self.actors
            .iter()
            .map(|(name, store)| StoreInfo {
                name: name.clone(),
                hash: actor_hash(store),
            })
            .collect()
    }

    /// Root commitment of this state.
    pub fn app_hash(&self) -> Hash {
        root_hash(&self.store_infos())
    }

    /// Commit metadata for this snapshot.
    pub fn commit_info(&self) -> CommitInfo {
        let store_infos = self.store_infos();
        CommitInfo {
            version: self.version,
            app_hash: root_hash(&store_infos),
            store_infos,
        }
    }
}

/// Hash one actor store's entries in key order.
fn actor_hash(store: &ActorStore) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in store.iter() {
        hasher.update(&(key.len() as u64).to_be_bytes());
        hasher.update(key);
        hasher.update(&(value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    Hash::from(*hasher.finalize().as_bytes())
}

fn root_hash(store_infos: &[StoreInfo]) -> Hash {
    let parts: Vec<&[u8]> = store_infos
        .iter()
        .flat_map(|info| [info.name.as_slice(), info.hash.as_bytes().as_slice()])
        .collect();
    Hash::from_parts(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::KvPair;

    fn changeset(version: u64, writes: &[(&str, KvPair)]) -> Changeset {
        let mut cs = Changeset::new(version);
        for (actor, pair) in writes {
            cs.add(actor.as_bytes(), pair.clone());
        }
        cs
    }

    #[test]
    fn test_apply_and_read() {
        let base = StateSnapshot::empty();
        let next = base.apply(&changeset(1, &[("bank", KvPair::set("alice", "10"))]));

        assert_eq!(next.version(), 1);
        assert_eq!(next.get(b"bank", b"alice"), Some(&b"10".to_vec()));
        // Base is untouched.
        assert_eq!(base.get(b"bank", b"alice"), None);
    }

    #[test]
    fn test_hash_is_history_independent() {
        let a = StateSnapshot::empty().apply(&changeset(
            1,
            &[
                ("bank", KvPair::set("alice", "10")),
                ("auth", KvPair::set("bob", "1")),
            ],
        ));

        let b = StateSnapshot::empty()
            .apply(&changeset(1, &[("auth", KvPair::set("bob", "1"))]))
            .apply(&changeset(
                2,
                &[
                    ("bank", KvPair::set("alice", "10")),
                    ("temp", KvPair::set("x", "y")),
                ],
            ))
            .apply(&changeset(3, &[("temp", KvPair::remove("x"))]));

        assert_eq!(a.app_hash(), b.app_hash());
        assert_eq!(b.actor_count(), 2);
    }

    #[test]
    fn test_commit_info_lists_sorted_stores() {
        let snapshot = StateSnapshot::empty().apply(&changeset(
            4,
            &[
                ("zeta", KvPair::set("k", "v")),
                ("alpha", KvPair::set("k", "v")),
            ],
        ));

        let info = snapshot.commit_info();
        assert_eq!(info.version, 4);
        assert_eq!(info.store_infos[0].name, b"alpha".to_vec());
        assert_eq!(info.store_infos[1].name, b"zeta".to_vec());
        assert_eq!(info.app_hash, snapshot.app_hash());
        assert!(info.store_hash(b"zeta").is_some());
    }
}
