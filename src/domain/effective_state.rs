use crate::domain::change_set::{AttendanceChanges, BlockChanges};
use crate::domain::models::{
    AttendanceKey, AttendancePatch, AttendanceRecord, AttendanceType, RecordId, ScheduleBlock,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceCellState {
    Empty,
    StagedFullDayAddition,
    StagedHalfDayAddition,
    ExistingFullDay,
    ExistingHalfDay,
    StagedRemovalOfExisting,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockCellState {
    Unblocked,
    StagedBlockAddition,
    EffectivelyBlocked,
    StagedBlockRemoval,
}

impl BlockCellState {
    /// Whether the day renders as unavailable once pending changes are applied.
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::StagedBlockAddition | Self::EffectivelyBlocked)
    }
}

/// Persisted attendance records indexed by id and by `(date, practice)`.
#[derive(Debug, Clone, Default)]
pub struct AttendanceSnapshot {
    records: BTreeMap<RecordId, AttendanceRecord>,
    by_key: HashMap<AttendanceKey, RecordId>,
}

impl AttendanceSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = AttendanceRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&AttendanceRecord> {
        self.records.get(&id)
    }

    /// Record for the cell; the lowest id wins if the store ever held duplicates.
    pub fn find(&self, key: &AttendanceKey) -> Option<&AttendanceRecord> {
        self.by_key.get(key).and_then(|id| self.records.get(id))
    }

    pub fn records(&self) -> impl Iterator<Item = &AttendanceRecord> {
        self.records.values()
    }

    pub fn in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = &AttendanceRecord> {
        self.records
            .values()
            .filter(move |record| start <= record.date && record.date <= end)
    }

    pub fn insert(&mut self, record: AttendanceRecord) {
        let key = record.key();
        let id = record.id;
        self.remove(id);
        self.records.insert(id, record);
        let keep_existing = self
            .by_key
            .get(&key)
            .is_some_and(|existing| *existing < id && self.records.contains_key(existing));
        if !keep_existing {
            self.by_key.insert(key, id);
        }
    }

    pub fn remove(&mut self, id: RecordId) -> Option<AttendanceRecord> {
        let removed = self.records.remove(&id)?;
        let key = removed.key();
        if self.by_key.get(&key) == Some(&id) {
            self.by_key.remove(&key);
            if let Some(fallback) = self
                .records
                .values()
                .filter(|record| record.key() == key)
                .map(|record| record.id)
                .min()
            {
                self.by_key.insert(key, fallback);
            }
        }
        Some(removed)
    }

    pub fn patch(&mut self, id: RecordId, patch: &AttendancePatch) {
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(attendance_type) = patch.attendance_type {
                record.attendance_type = attendance_type;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockSnapshot {
    blocks: BTreeMap<RecordId, ScheduleBlock>,
}

impl BlockSnapshot {
    pub fn from_blocks(blocks: impl IntoIterator<Item = ScheduleBlock>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|block| (block.id, block)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&ScheduleBlock> {
        self.blocks.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ScheduleBlock> {
        self.blocks.values()
    }

    pub fn covering(&self, date: NaiveDate) -> impl Iterator<Item = &ScheduleBlock> {
        self.blocks.values().filter(move |block| block.covers(date))
    }

    pub fn insert(&mut self, block: ScheduleBlock) {
        self.blocks.insert(block.id, block);
    }

    pub fn remove(&mut self, id: RecordId) -> Option<ScheduleBlock> {
        self.blocks.remove(&id)
    }
}

/// Attendance type of a persisted record after any staged update.
pub fn effective_attendance_type(
    record: &AttendanceRecord,
    changes: &AttendanceChanges,
) -> AttendanceType {
    changes
        .update(record.id)
        .and_then(|patch| patch.attendance_type)
        .unwrap_or(record.attendance_type)
}

pub fn attendance_cell_state(
    snapshot: &AttendanceSnapshot,
    changes: &AttendanceChanges,
    key: &AttendanceKey,
) -> AttendanceCellState {
    if let Some(record) = snapshot.find(key) {
        if changes.is_removed(record.id) {
            return AttendanceCellState::StagedRemovalOfExisting;
        }
        return match effective_attendance_type(record, changes) {
            AttendanceType::FullDay => AttendanceCellState::ExistingFullDay,
            AttendanceType::HalfDay => AttendanceCellState::ExistingHalfDay,
        };
    }

    match changes.addition(key).map(|draft| draft.resolved_type()) {
        Some(AttendanceType::FullDay) => AttendanceCellState::StagedFullDayAddition,
        Some(AttendanceType::HalfDay) => AttendanceCellState::StagedHalfDayAddition,
        None => AttendanceCellState::Empty,
    }
}

pub fn block_cell_state(
    snapshot: &BlockSnapshot,
    changes: &BlockChanges,
    date: NaiveDate,
) -> BlockCellState {
    if changes.has_addition(&date) {
        return BlockCellState::StagedBlockAddition;
    }

    let mut covered = false;
    for block in snapshot.covering(date) {
        if !changes.is_removed(block.id) {
            return BlockCellState::EffectivelyBlocked;
        }
        covered = true;
    }

    if covered {
        BlockCellState::StagedBlockRemoval
    } else {
        BlockCellState::Unblocked
    }
}
