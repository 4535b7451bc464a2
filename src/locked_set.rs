//! Secondary record of which notes are locked.
//!
//! Persisted apart from the main store as `{ "<id>": true }` so lock state
//! survives damage to either file. The note's own `isLocked` flag is
//! authoritative; [`LockedSet::reconcile`] repairs this copy from it.
use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::NoteMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedSet {
    ids: BTreeSet<String>,
}

impl LockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from the primary flags.
    pub fn from_notes(notes: &NoteMap) -> Self {
        LockedSet {
            ids: notes
                .values()
                .filter(|note| note.is_locked)
                .map(|note| note.id.clone())
                .collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn set(&mut self, id: &str, locked: bool) {
        if locked {
            self.insert(id);
        } else {
            self.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }

    /// Makes the set agree with `notes`, returning how many entries changed.
    pub fn reconcile(&mut self, notes: &NoteMap) -> usize {
        let expected = LockedSet::from_notes(notes);
        let repaired = self.ids.symmetric_difference(&expected.ids).count();
        if repaired > 0 {
            warn!(
                "Locked-set disagreed with note flags on {} entries, repairing",
                repaired
            );
            *self = expected;
        }
        repaired
    }
}

impl Serialize for LockedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.ids.iter().map(|id| (id, true)))
    }
}

impl<'de> Deserialize<'de> for LockedSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(LockedSet {
            ids: raw
                .into_iter()
                .filter(|(_, value)| value.as_bool() == Some(true))
                .map(|(id, _)| id)
                .collect(),
        })
    }
}
