use crate::application::attendance_editor::AttendanceEditor;
use crate::application::commit::{execute_commit, CommitOutcome, CommitPlan, CommitReport};
use crate::domain::block_staging::{apply_block_bulk, toggle_block_cell, BlockBulkCriteria};
use crate::domain::calendar::{days_inclusive, month_bounds};
use crate::domain::change_set::{BlockChanges, PendingCounts};
use crate::domain::conflicts::{
    detect_conflicts, detect_staged_conflicts, AttendanceConflict, ConflictResolution,
};
use crate::domain::effective_state::{block_cell_state, BlockCellState, BlockSnapshot};
use crate::domain::models::{AttendanceRecord, BlockDraft, Practice, ScheduleBlock};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

pub struct BlockEditor<S: ?Sized> {
    store: Arc<S>,
    snapshot: BlockSnapshot,
    changes: BlockChanges,
    default_reason: String,
}

/// Result of gating a block commit on attendance conflicts.
pub enum BlockCommitPreparation {
    /// Conflicts exist and no resolution was chosen; nothing was changed.
    Conflicts(Vec<AttendanceConflict>),
    Cancelled {
        discarded: usize,
    },
    Ready {
        blocks: CommitPlan<ScheduleBlock>,
        /// Present when conflicting attendance is removed in the same commit.
        attendance: Option<CommitPlan<AttendanceRecord>>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockCommitOutcome {
    Committed {
        blocks: CommitReport,
        attendance: Option<CommitReport>,
    },
    ConflictsFound {
        conflicts: Vec<AttendanceConflict>,
    },
    Cancelled {
        discarded: usize,
    },
}

impl<S> BlockEditor<S>
where
    S: RecordStore<ScheduleBlock> + ?Sized + 'static,
{
    pub async fn load(store: Arc<S>, default_reason: impl Into<String>) -> Result<Self, InfraError> {
        let blocks = store.list_all().await?;
        Ok(Self::from_blocks(store, blocks, default_reason))
    }

    pub fn from_blocks(
        store: Arc<S>,
        blocks: Vec<ScheduleBlock>,
        default_reason: impl Into<String>,
    ) -> Self {
        Self {
            store,
            snapshot: BlockSnapshot::from_blocks(blocks),
            changes: BlockChanges::new(),
            default_reason: default_reason.into(),
        }
    }

    pub fn effective_state(&self, date: NaiveDate) -> BlockCellState {
        block_cell_state(&self.snapshot, &self.changes, date)
    }

    pub fn range_states(&self, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, BlockCellState)> {
        days_inclusive(start, end)
            .map(|date| (date, self.effective_state(date)))
            .collect()
    }

    pub fn month_states(&self, month_date: NaiveDate) -> Vec<(NaiveDate, BlockCellState)> {
        let (first, last) = month_bounds(month_date);
        self.range_states(first, last)
    }

    /// Toggles a single day; new single-day blocks carry the session's default reason.
    pub fn toggle_cell(&mut self, date: NaiveDate) -> BlockCellState {
        toggle_block_cell(&self.snapshot, &mut self.changes, date, &self.default_reason)
    }

    pub fn apply_bulk(&mut self, criteria: &BlockBulkCriteria) -> usize {
        apply_block_bulk(&self.snapshot, &mut self.changes, criteria)
    }

    pub fn detect_conflicts<A>(
        &self,
        candidate: &BlockDraft,
        attendance: &AttendanceEditor<A>,
        practices: &[Practice],
    ) -> Vec<AttendanceConflict>
    where
        A: RecordStore<AttendanceRecord> + ?Sized + 'static,
    {
        detect_conflicts(candidate, attendance.snapshot(), attendance.changes(), practices)
    }

    /// Conflicts for every block addition currently staged.
    pub fn staged_conflicts<A>(
        &self,
        attendance: &AttendanceEditor<A>,
        practices: &[Practice],
    ) -> Vec<AttendanceConflict>
    where
        A: RecordStore<AttendanceRecord> + ?Sized + 'static,
    {
        detect_staged_conflicts(&self.changes, attendance.snapshot(), attendance.changes(), practices)
    }

    pub fn snapshot(&self) -> &BlockSnapshot {
        &self.snapshot
    }

    pub fn changes(&self) -> &BlockChanges {
        &self.changes
    }

    pub fn pending_counts(&self) -> PendingCounts {
        self.changes.counts()
    }

    pub fn default_reason(&self) -> &str {
        &self.default_reason
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn commit_plan(&self) -> CommitPlan<ScheduleBlock> {
        CommitPlan::from_changes(&self.changes)
    }

    /// Gates the staged blocks on attendance conflicts.
    ///
    /// Cancelling drops every staged block addition and keeps staged removals.
    /// Removing conflicts plans the attendance removals alongside whatever the
    /// attendance session already had staged, without mutating that session.
    pub fn prepare_commit<A>(
        &mut self,
        attendance: &AttendanceEditor<A>,
        practices: &[Practice],
        resolution: Option<ConflictResolution>,
    ) -> BlockCommitPreparation
    where
        A: RecordStore<AttendanceRecord> + ?Sized + 'static,
    {
        let conflicts = self.staged_conflicts(attendance, practices);
        if conflicts.is_empty() {
            return BlockCommitPreparation::Ready {
                blocks: self.commit_plan(),
                attendance: None,
            };
        }

        match resolution {
            None => BlockCommitPreparation::Conflicts(conflicts),
            Some(ConflictResolution::CancelBlockStaging) => BlockCommitPreparation::Cancelled {
                discarded: self.changes.retain_additions(|_, _| false),
            },
            Some(ConflictResolution::RemoveConflictingAttendance) => {
                let mut attendance_changes = attendance.changes().clone();
                for conflict in &conflicts {
                    attendance_changes.stage_removal(conflict.record_id);
                }
                BlockCommitPreparation::Ready {
                    blocks: self.commit_plan(),
                    attendance: Some(CommitPlan::from_changes(&attendance_changes)),
                }
            }
        }
    }

    pub fn finish_commit(&mut self, outcome: CommitOutcome<ScheduleBlock>) -> CommitReport {
        let report = outcome.report();
        for id in outcome.deleted {
            self.snapshot.remove(id);
        }
        for block in outcome.created {
            self.snapshot.insert(block);
        }
        self.changes.clear();
        report
    }

    /// Commits staged blocks after conflict gating. Both sessions are cleared
    /// only when every operation of both batches succeeded.
    pub async fn commit<A>(
        &mut self,
        attendance: &mut AttendanceEditor<A>,
        practices: &[Practice],
        resolution: Option<ConflictResolution>,
    ) -> Result<BlockCommitOutcome, InfraError>
    where
        A: RecordStore<AttendanceRecord> + ?Sized + 'static,
    {
        let (block_plan, attendance_plan) = match self.prepare_commit(attendance, practices, resolution) {
            BlockCommitPreparation::Conflicts(conflicts) => {
                return Ok(BlockCommitOutcome::ConflictsFound { conflicts });
            }
            BlockCommitPreparation::Cancelled { discarded } => {
                return Ok(BlockCommitOutcome::Cancelled { discarded });
            }
            BlockCommitPreparation::Ready { blocks, attendance } => (blocks, attendance),
        };

        let (blocks, attendance_outcome) =
            execute_block_commit(self.store(), block_plan, attendance.store(), attendance_plan).await?;
        Ok(BlockCommitOutcome::Committed {
            blocks: self.finish_commit(blocks),
            attendance: attendance_outcome.map(|outcome| attendance.finish_commit(outcome)),
        })
    }

    pub fn revert(&mut self) -> PendingCounts {
        let discarded = self.changes.counts();
        self.changes.clear();
        discarded
    }
}

/// Runs the block batch and, when present, the attendance batch concurrently.
///
/// A failure in either reports one aggregate `CommitFailed` over both batches.
pub async fn execute_block_commit<B, A>(
    block_store: Arc<B>,
    blocks: CommitPlan<ScheduleBlock>,
    attendance_store: Arc<A>,
    attendance: Option<CommitPlan<AttendanceRecord>>,
) -> Result<(CommitOutcome<ScheduleBlock>, Option<CommitOutcome<AttendanceRecord>>), InfraError>
where
    B: RecordStore<ScheduleBlock> + ?Sized + 'static,
    A: RecordStore<AttendanceRecord> + ?Sized + 'static,
{
    let Some(attendance) = attendance else {
        return Ok((execute_commit(block_store, blocks).await?, None));
    };

    let total = blocks.len() + attendance.len();
    let (block_result, attendance_result) = tokio::join!(
        execute_commit(block_store, blocks),
        execute_commit(attendance_store, attendance)
    );
    match (block_result, attendance_result) {
        (Ok(blocks), Ok(attendance)) => Ok((blocks, Some(attendance))),
        (block_result, attendance_result) => {
            let mut failed = 0;
            let mut details = Vec::new();
            for error in [block_result.err(), attendance_result.err()].into_iter().flatten() {
                match error {
                    InfraError::CommitFailed {
                        failed: batch_failed,
                        details: batch_details,
                        ..
                    } => {
                        failed += batch_failed;
                        details.extend(batch_details);
                    }
                    other => {
                        failed += 1;
                        details.push(other.to_string());
                    }
                }
            }
            Err(InfraError::CommitFailed {
                failed,
                total,
                details,
            })
        }
    }
}
