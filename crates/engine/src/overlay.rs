//! Copy-on-write branched state for a single execution attempt.
//!
//! This module provides [`BranchedState`], which wraps a committed
//! [`StateSnapshot`] and captures all writes without modifying it. Every
//! execution (CheckTx, simulation, proposal validation, optimistic run, final
//! run) gets its own branch, so nothing it writes is visible elsewhere until
//! the branch is turned into a changeset and committed.

use crate::StateSnapshot;
use cadence_types::{Changeset, Hash, KvPair};

type WriteSet = im::OrdMap<Vec<u8>, im::OrdMap<Vec<u8>, Option<Vec<u8>>>>;

/// A write overlay over one committed version.
///
/// Reads check the overlay first, then fall through to the base snapshot.
/// Writes only go to the overlay and are discarded when the branch is
/// dropped. Cloning a branch is O(1), which the state-transition function
/// uses to isolate per-transaction writes:
///
/// ```ignore
/// let mut tx_state = state.clone();
/// match run_tx(&mut tx_state, tx) {
///     Ok(()) => *state = tx_state, // keep the transaction's writes
///     Err(_) => {}                 // drop them
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BranchedState {
    /// The committed state this branch was taken from (read-only).
    base: StateSnapshot,

    /// Overlay writes per actor. `None` marks a key removed in the overlay;
    /// lookups for it return nothing even if the base has a value.
    writes: WriteSet,
}

impl BranchedState {
    /// Branch off a committed snapshot.
    pub fn new(base: StateSnapshot) -> Self {
        Self {
            base,
            writes: WriteSet::new(),
        }
    }

    /// Version of the committed state this branch is rooted at.
    pub fn base_version(&self) -> u64 {
        self.base.version()
    }

    /// Read a value, overlay first.
    pub fn get(&self, actor: &[u8], key: &[u8]) -> Option<Vec<u8>> {
        if let Some(written) = self.writes.get(actor).and_then(|w| w.get(key)) {
            return written.clone();
        }
        self.base.get(actor, key).cloned()
    }

    /// Whether `key` currently has a value.
    pub fn contains(&self, actor: &[u8], key: &[u8]) -> bool {
        self.get(actor, key).is_some()
    }

    /// Write a value into the overlay.
    pub fn set(&mut self, actor: &[u8], key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.write(actor, key.into(), Some(value.into()));
    }

    /// Remove a key in the overlay.
    pub fn remove(&mut self, actor: &[u8], key: impl Into<Vec<u8>>) {
        self.write(actor, key.into(), None);
    }

    fn write(&mut self, actor: &[u8], key: Vec<u8>, value: Option<Vec<u8>>) {
        let mut actor_writes = self.writes.get(actor).cloned().unwrap_or_default();
        actor_writes.insert(key, value);
        self.writes.insert(actor.to_vec(), actor_writes);
    }

    /// Whether anything has been written.
    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Number of keys written in the overlay.
    pub fn write_count(&self) -> usize {
        self.writes.values().map(|w| w.len()).sum()
    }

    /// Collect the overlay into a canonical changeset for `version`.
    ///
    /// Actors and keys come out sorted, so identical writes always produce
    /// identical changesets.
    pub fn to_changeset(&self, version: u64) -> Changeset {
        let mut changeset = Changeset::new(version);
        for (actor, actor_writes) in self.writes.iter() {
            for (key, value) in actor_writes.iter() {
                changeset.add(
                    actor,
                    KvPair {
                        key: key.clone(),
                        value: value.clone(),
                    },
                );
            }
        }
        changeset
    }

    /// The state this branch would commit as `version`.
    pub fn working_snapshot(&self, version: u64) -> StateSnapshot {
        self.base.apply(&self.to_changeset(version))
    }

    /// App hash the branch would produce if committed.
    pub fn working_hash(&self) -> Hash {
        self.working_snapshot(self.base.version() + 1).app_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> StateSnapshot {
        let mut cs = Changeset::new(1);
        cs.add(b"bank", KvPair::set("alice", "10"));
        cs.add(b"bank", KvPair::set("bob", "5"));
        StateSnapshot::empty().apply(&cs)
    }

    #[test]
    fn test_reads_fall_through_to_base() {
        let branch = BranchedState::new(base());
        assert_eq!(branch.get(b"bank", b"alice"), Some(b"10".to_vec()));
        assert_eq!(branch.get(b"bank", b"carol"), None);
        assert!(!branch.is_dirty());
        assert_eq!(branch.base_version(), 1);
    }

    #[test]
    fn test_overlay_shadows_base() {
        let snapshot = base();
        let mut branch = BranchedState::new(snapshot.clone());
        branch.set(b"bank", "alice", "7");
        branch.remove(b"bank", "bob");

        assert_eq!(branch.get(b"bank", b"alice"), Some(b"7".to_vec()));
        assert!(!branch.contains(b"bank", b"bob"));

        // The committed snapshot never sees overlay writes.
        assert_eq!(snapshot.get(b"bank", b"alice"), Some(&b"10".to_vec()));
        assert_eq!(snapshot.get(b"bank", b"bob"), Some(&b"5".to_vec()));
    }

    #[test]
    fn test_clone_isolates_writes() {
        let mut state = BranchedState::new(base());
        let mut tx_state = state.clone();
        tx_state.set(b"bank", "carol", "1");

        assert!(!state.contains(b"bank", b"carol"));
        state = tx_state;
        assert!(state.contains(b"bank", b"carol"));
    }

    #[test]
    fn test_changeset_is_sorted() {
        let mut branch = BranchedState::new(StateSnapshot::empty());
        branch.set(b"zeta", "b", "2");
        branch.set(b"alpha", "z", "1");
        branch.set(b"zeta", "a", "1");

        let cs = branch.to_changeset(9);
        assert_eq!(cs.version, 9);
        assert_eq!(cs.changes[0].actor, b"alpha".to_vec());
        assert_eq!(cs.changes[1].changes[0].key, b"a".to_vec());
        assert_eq!(branch.write_count(), 3);
    }

    #[test]
    fn test_working_hash_matches_commit() {
        let mut branch = BranchedState::new(base());
        branch.set(b"bank", "carol", "3");

        let committed = base().apply(&branch.to_changeset(2));
        assert_eq!(branch.working_hash(), committed.app_hash());
    }
}
