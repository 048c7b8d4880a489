use crate::domain::models::{PersistedRecord, RecordId};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Asynchronous id-addressed store for one kind of persisted record.
#[async_trait]
pub trait RecordStore<R>: Send + Sync
where
    R: PersistedRecord,
{
    async fn list_all(&self) -> Result<Vec<R>, InfraError>;

    /// Persists `draft` and returns the id the store assigned to it.
    ///
    /// Fails with `Duplicate` when a stored record already holds the draft's unique key.
    async fn create(&self, draft: R::Draft) -> Result<RecordId, InfraError>;

    /// Fails with `NotFound` when `id` does not exist.
    async fn update(&self, id: RecordId, patch: R::Patch) -> Result<(), InfraError>;

    /// Fails with `NotFound` when `id` does not exist.
    async fn delete_by_id(&self, id: RecordId) -> Result<(), InfraError>;
}

#[derive(Debug)]
pub struct InMemoryRecordStore<R> {
    state: Mutex<InMemoryState<R>>,
}

#[derive(Debug)]
struct InMemoryState<R> {
    records: BTreeMap<RecordId, R>,
    next_id: RecordId,
}

impl<R> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                records: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl<R> InMemoryRecordStore<R>
where
    R: PersistedRecord,
{
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id(), record))
            .collect::<BTreeMap<_, _>>();
        let next_id = records.keys().next_back().map(|id| id + 1).unwrap_or(1);
        Self {
            state: Mutex::new(InMemoryState { records, next_id }),
        }
    }

    /// Current contents ordered by id.
    pub fn records(&self) -> Result<Vec<R>, InfraError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState<R>>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("record store lock poisoned: {error}")))
    }
}

#[async_trait]
impl<R> RecordStore<R> for InMemoryRecordStore<R>
where
    R: PersistedRecord,
{
    async fn list_all(&self) -> Result<Vec<R>, InfraError> {
        self.records()
    }

    async fn create(&self, draft: R::Draft) -> Result<RecordId, InfraError> {
        let mut state = self.lock()?;
        if let Some(key) = R::draft_unique_key(&draft) {
            let taken = state
                .records
                .values()
                .any(|record| record.unique_key().as_deref() == Some(key.as_str()));
            if taken {
                return Err(InfraError::Duplicate { kind: R::KIND, key });
            }
        }
        let id = state.next_id;
        state.next_id += 1;
        state.records.insert(id, R::from_draft(id, draft));
        Ok(id)
    }

    async fn update(&self, id: RecordId, patch: R::Patch) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(&id)
            .ok_or(InfraError::NotFound { kind: R::KIND, id })?;
        record.apply_patch(&patch);
        Ok(())
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        state
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(InfraError::NotFound { kind: R::KIND, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AttendanceDraft, AttendanceKey, AttendancePatch, AttendanceRecord, AttendanceType,
        RecordKind,
    };
    use chrono::NaiveDate;

    fn key() -> AttendanceKey {
        AttendanceKey::new(NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"), 7)
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_after_seeded_records() {
        let seeded = AttendanceRecord::from_draft(4, AttendanceDraft::new(key(), None));
        let store = InMemoryRecordStore::with_records(vec![seeded]);

        let id = store
            .create(AttendanceDraft::new(key(), Some(AttendanceType::HalfDay)))
            .await
            .expect("create record");

        assert_eq!(id, 5);
        let records = store.list_all().await.expect("list records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].attendance_type, AttendanceType::HalfDay);
    }

    #[tokio::test]
    async fn create_rejects_a_second_record_for_the_same_cell() {
        let store = InMemoryRecordStore::<AttendanceRecord>::default();
        store
            .create(AttendanceDraft::new(key(), None))
            .await
            .expect("first create");

        let duplicate = store
            .create(AttendanceDraft::new(key(), Some(AttendanceType::HalfDay)))
            .await;

        assert!(matches!(
            duplicate,
            Err(InfraError::Duplicate {
                kind: RecordKind::Attendance,
                ..
            })
        ));
        assert_eq!(store.records().expect("records").len(), 1);

        let other_practice = AttendanceKey::new(key().date, 8);
        store
            .create(AttendanceDraft::new(other_practice, None))
            .await
            .expect("other practice on the same day");
    }

    #[tokio::test]
    async fn update_and_delete_reject_missing_ids() {
        let store = InMemoryRecordStore::<AttendanceRecord>::default();

        let update = store
            .update(9, AttendancePatch::attendance_type(AttendanceType::HalfDay))
            .await;
        assert!(matches!(
            update,
            Err(InfraError::NotFound {
                kind: RecordKind::Attendance,
                id: 9
            })
        ));
        assert!(matches!(
            store.delete_by_id(9).await,
            Err(InfraError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_applies_patch_in_place() {
        let store = InMemoryRecordStore::<AttendanceRecord>::default();
        let id = store
            .create(AttendanceDraft::new(key(), None))
            .await
            .expect("create record");

        store
            .update(id, AttendancePatch::attendance_type(AttendanceType::HalfDay))
            .await
            .expect("update record");
        let records = store.records().expect("records");
        assert_eq!(records[0].attendance_type, AttendanceType::HalfDay);

        store.delete_by_id(id).await.expect("delete record");
        assert!(store.records().expect("records").is_empty());
    }
}
