use crate::domain::models::{AttendanceDraft, AttendanceKey, AttendancePatch, BlockDraft, RecordId};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;

pub type AttendanceChanges = PendingChangeSet<AttendanceKey, AttendanceDraft, AttendancePatch>;
pub type BlockChanges = PendingChangeSet<NaiveDate, BlockDraft, Infallible>;

/// In-memory staging area for one editing session.
///
/// Additions are keyed by the cell key of records that do not exist yet;
/// removals and updates are keyed by persisted id. A removed id never keeps
/// a pending update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChangeSet<K, D, P> {
    additions: BTreeMap<K, D>,
    removals: BTreeSet<RecordId>,
    updates: BTreeMap<RecordId, P>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PendingCounts {
    pub additions: usize,
    pub removals: usize,
    pub updates: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.updates
    }
}

impl<K, D, P> Default for PendingChangeSet<K, D, P> {
    fn default() -> Self {
        Self {
            additions: BTreeMap::new(),
            removals: BTreeSet::new(),
            updates: BTreeMap::new(),
        }
    }
}

impl<K, D, P> PendingChangeSet<K, D, P>
where
    K: Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty() && self.updates.is_empty()
    }

    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            additions: self.additions.len(),
            removals: self.removals.len(),
            updates: self.updates.len(),
        }
    }

    pub fn clear(&mut self) {
        self.additions.clear();
        self.removals.clear();
        self.updates.clear();
    }

    pub fn addition(&self, key: &K) -> Option<&D> {
        self.additions.get(key)
    }

    pub fn addition_mut(&mut self, key: &K) -> Option<&mut D> {
        self.additions.get_mut(key)
    }

    pub fn has_addition(&self, key: &K) -> bool {
        self.additions.contains_key(key)
    }

    pub fn stage_addition(&mut self, key: K, draft: D) {
        self.additions.insert(key, draft);
    }

    pub fn discard_addition(&mut self, key: &K) -> Option<D> {
        self.additions.remove(key)
    }

    /// Keeps only the additions for which `keep` returns true and returns how many were dropped.
    pub fn retain_additions<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &D) -> bool,
    {
        let before = self.additions.len();
        self.additions.retain(|key, draft| keep(key, draft));
        before - self.additions.len()
    }

    pub fn additions(&self) -> impl Iterator<Item = (&K, &D)> {
        self.additions.iter()
    }

    pub fn is_removed(&self, id: RecordId) -> bool {
        self.removals.contains(&id)
    }

    /// Marks `id` for deletion and drops any update staged for it.
    pub fn stage_removal(&mut self, id: RecordId) -> bool {
        self.updates.remove(&id);
        self.removals.insert(id)
    }

    pub fn unstage_removal(&mut self, id: RecordId) -> bool {
        self.removals.remove(&id)
    }

    pub fn removals(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.removals.iter().copied()
    }

    pub fn update(&self, id: RecordId) -> Option<&P> {
        self.updates.get(&id)
    }

    /// Stages `patch` for `id`. Ignored while `id` is staged for removal.
    pub fn stage_update(&mut self, id: RecordId, patch: P) -> bool {
        if self.removals.contains(&id) {
            return false;
        }
        self.updates.insert(id, patch);
        true
    }

    pub fn clear_update(&mut self, id: RecordId) -> Option<P> {
        self.updates.remove(&id)
    }

    pub fn updates(&self) -> impl Iterator<Item = (RecordId, &P)> {
        self.updates.iter().map(|(id, patch)| (*id, patch))
    }
}
