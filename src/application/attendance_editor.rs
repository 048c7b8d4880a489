use crate::application::commit::{execute_commit, CommitOutcome, CommitPlan, CommitReport};
use crate::domain::attendance_staging::{
    apply_attendance_bulk, toggle_attendance_cell, AttendanceBulkCriteria,
};
use crate::domain::calendar::{days_inclusive, month_bounds};
use crate::domain::change_set::{AttendanceChanges, PendingCounts};
use crate::domain::effective_state::{attendance_cell_state, AttendanceCellState, AttendanceSnapshot};
use crate::domain::models::{AttendanceKey, AttendanceRecord, PracticeId, RecordId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use chrono::NaiveDate;
use std::sync::Arc;

/// One attendance editing session: the persisted snapshot it was seeded
/// with plus the changes staged on top of it.
pub struct AttendanceEditor<S: ?Sized> {
    store: Arc<S>,
    snapshot: AttendanceSnapshot,
    changes: AttendanceChanges,
}

impl<S> AttendanceEditor<S>
where
    S: RecordStore<AttendanceRecord> + ?Sized + 'static,
{
    pub async fn load(store: Arc<S>) -> Result<Self, InfraError> {
        let records = store.list_all().await?;
        Ok(Self::from_records(store, records))
    }

    pub fn from_records(store: Arc<S>, records: Vec<AttendanceRecord>) -> Self {
        Self {
            store,
            snapshot: AttendanceSnapshot::from_records(records),
            changes: AttendanceChanges::new(),
        }
    }

    pub fn effective_state(&self, key: &AttendanceKey) -> AttendanceCellState {
        attendance_cell_state(&self.snapshot, &self.changes, key)
    }

    pub fn range_states(
        &self,
        practice_id: PracticeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<(NaiveDate, AttendanceCellState)> {
        days_inclusive(start, end)
            .map(|date| {
                let key = AttendanceKey::new(date, practice_id);
                (date, self.effective_state(&key))
            })
            .collect()
    }

    /// Effective states for every day of the month containing `month_date`.
    pub fn month_states(
        &self,
        practice_id: PracticeId,
        month_date: NaiveDate,
    ) -> Vec<(NaiveDate, AttendanceCellState)> {
        let (first, last) = month_bounds(month_date);
        self.range_states(practice_id, first, last)
    }

    pub fn toggle_cell(&mut self, key: AttendanceKey) -> AttendanceCellState {
        toggle_attendance_cell(&self.snapshot, &mut self.changes, key)
    }

    pub fn apply_bulk(&mut self, criteria: &AttendanceBulkCriteria) -> usize {
        apply_attendance_bulk(&self.snapshot, &mut self.changes, criteria)
    }

    /// Stages removal of a persisted record; unknown ids are ignored.
    pub fn stage_removal(&mut self, id: RecordId) -> bool {
        if self.snapshot.get(id).is_none() {
            return false;
        }
        self.changes.stage_removal(id)
    }

    pub fn snapshot(&self) -> &AttendanceSnapshot {
        &self.snapshot
    }

    pub fn changes(&self) -> &AttendanceChanges {
        &self.changes
    }

    pub fn pending_counts(&self) -> PendingCounts {
        self.changes.counts()
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn commit_plan(&self) -> CommitPlan<AttendanceRecord> {
        CommitPlan::from_changes(&self.changes)
    }

    /// Folds a successful batch into the snapshot and empties the change set.
    pub fn finish_commit(&mut self, outcome: CommitOutcome<AttendanceRecord>) -> CommitReport {
        let report = outcome.report();
        for id in outcome.deleted {
            self.snapshot.remove(id);
        }
        for (id, patch) in &outcome.updated {
            self.snapshot.patch(*id, patch);
        }
        for record in outcome.created {
            self.snapshot.insert(record);
        }
        self.changes.clear();
        report
    }

    /// Flushes every staged change. On failure the staged changes are kept as they were.
    pub async fn commit(&mut self) -> Result<CommitReport, InfraError> {
        let outcome = execute_commit(self.store(), self.commit_plan()).await?;
        Ok(self.finish_commit(outcome))
    }

    pub fn revert(&mut self) -> PendingCounts {
        let discarded = self.changes.counts();
        self.changes.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attendance_staging::AttendanceBulkAction;
    use crate::domain::calendar::ALL_WEEKDAYS;
    use crate::domain::models::{AttendanceDraft, AttendanceType, PersistedRecord};
    use crate::infrastructure::record_store::InMemoryRecordStore;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn record(id: RecordId, day: &str, practice_id: PracticeId) -> AttendanceRecord {
        AttendanceRecord::from_draft(
            id,
            AttendanceDraft::new(AttendanceKey::new(date(day), practice_id), None),
        )
    }

    async fn editor_with(
        records: Vec<AttendanceRecord>,
    ) -> (
        Arc<InMemoryRecordStore<AttendanceRecord>>,
        AttendanceEditor<InMemoryRecordStore<AttendanceRecord>>,
    ) {
        let store = Arc::new(InMemoryRecordStore::with_records(records));
        let editor = AttendanceEditor::load(Arc::clone(&store))
            .await
            .expect("load editor");
        (store, editor)
    }

    #[tokio::test]
    async fn revert_discards_staging_without_touching_store() {
        let (store, mut editor) = editor_with(Vec::new()).await;
        let key = AttendanceKey::new(date("2024-03-01"), 7);

        assert_eq!(editor.toggle_cell(key), AttendanceCellState::StagedFullDayAddition);
        assert_eq!(editor.effective_state(&key), AttendanceCellState::StagedFullDayAddition);

        let discarded = editor.revert();
        assert_eq!(discarded.additions, 1);
        assert_eq!(editor.effective_state(&key), AttendanceCellState::Empty);
        assert!(store.records().expect("records").is_empty());
    }

    #[tokio::test]
    async fn commit_of_one_addition_and_one_removal_clears_pending_state() {
        let (store, mut editor) = editor_with(vec![record(1, "2024-03-04", 7)]).await;
        let added = AttendanceKey::new(date("2024-03-05"), 7);
        let removed = AttendanceKey::new(date("2024-03-04"), 7);

        editor.toggle_cell(added);
        editor.toggle_cell(removed);
        editor.toggle_cell(removed);
        assert_eq!(editor.effective_state(&removed), AttendanceCellState::StagedRemovalOfExisting);

        let report = editor.commit().await.expect("commit succeeds");

        assert_eq!(
            report,
            CommitReport {
                created: 1,
                updated: 0,
                deleted: 1
            }
        );
        assert!(editor.changes().is_empty());
        assert_eq!(editor.effective_state(&added), AttendanceCellState::ExistingFullDay);
        assert_eq!(editor.effective_state(&removed), AttendanceCellState::Empty);
        let records = store.records().expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), added);
    }

    #[tokio::test]
    async fn failed_commit_keeps_pending_state_unchanged() {
        let (store, mut editor) = editor_with(vec![record(1, "2024-03-04", 7)]).await;
        let removed = AttendanceKey::new(date("2024-03-04"), 7);
        editor.toggle_cell(removed);
        editor.toggle_cell(removed);
        editor.toggle_cell(AttendanceKey::new(date("2024-03-06"), 7));
        let before = editor.changes().clone();

        store.delete_by_id(1).await.expect("delete behind the editor");
        let result = editor.commit().await;

        assert!(matches!(result, Err(InfraError::CommitFailed { failed: 1, total: 2, .. })));
        assert_eq!(editor.changes(), &before);
        assert_eq!(editor.pending_counts().total(), 2);
    }

    #[tokio::test]
    async fn retried_commit_never_writes_a_second_record_for_a_cell() {
        let (store, mut editor) = editor_with(vec![record(1, "2024-03-04", 7)]).await;
        let added = AttendanceKey::new(date("2024-03-05"), 7);
        editor.toggle_cell(added);
        assert!(editor.stage_removal(1));

        store.delete_by_id(1).await.expect("delete behind the editor");
        let first = editor.commit().await;
        assert!(matches!(first, Err(InfraError::CommitFailed { failed: 1, total: 2, .. })));

        let second = editor.commit().await;
        assert!(matches!(second, Err(InfraError::CommitFailed { failed: 2, total: 2, .. })));

        let records = store.records().expect("records");
        assert_eq!(records.iter().filter(|record| record.key() == added).count(), 1);
        assert_eq!(editor.pending_counts().total(), 2);
    }

    #[tokio::test]
    async fn committed_update_is_reflected_in_snapshot() {
        let (store, mut editor) = editor_with(vec![record(3, "2024-03-04", 2)]).await;
        let key = AttendanceKey::new(date("2024-03-04"), 2);

        assert_eq!(editor.toggle_cell(key), AttendanceCellState::ExistingHalfDay);
        editor.commit().await.expect("commit succeeds");

        assert_eq!(editor.snapshot().get(3).map(|r| r.attendance_type), Some(AttendanceType::HalfDay));
        assert_eq!(editor.effective_state(&key), AttendanceCellState::ExistingHalfDay);
        assert_eq!(
            store.records().expect("records")[0].attendance_type,
            AttendanceType::HalfDay
        );
    }

    #[tokio::test]
    async fn month_view_and_bulk_select_agree() {
        let (_store, mut editor) = editor_with(vec![record(1, "2024-02-05", 4)]).await;
        let visited = editor.apply_bulk(&AttendanceBulkCriteria {
            action: AttendanceBulkAction::Select,
            practice_id: 4,
            start_date: date("2024-02-01"),
            end_date: date("2024-02-29"),
            weekdays: ALL_WEEKDAYS.into_iter().collect(),
            attendance_type: Some(AttendanceType::HalfDay),
        });
        assert_eq!(visited, 29);

        let month = editor.month_states(4, date("2024-02-17"));
        assert_eq!(month.len(), 29);
        assert_eq!(month[4], (date("2024-02-05"), AttendanceCellState::ExistingHalfDay));
        assert!(month
            .iter()
            .filter(|(day, _)| *day != date("2024-02-05"))
            .all(|(_, state)| *state == AttendanceCellState::StagedHalfDayAddition));
        assert_eq!(editor.pending_counts().additions, 28);
        assert_eq!(editor.pending_counts().updates, 1);
    }

    #[tokio::test]
    async fn stage_removal_ignores_unknown_ids() {
        let (_store, mut editor) = editor_with(vec![record(1, "2024-02-05", 4)]).await;
        assert!(!editor.stage_removal(99));
        assert!(editor.stage_removal(1));
        assert_eq!(editor.pending_counts().removals, 1);
    }
}
