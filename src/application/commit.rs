use crate::domain::change_set::PendingChangeSet;
use crate::domain::models::{PersistedRecord, RecordId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Store operations derived from a pending change set, detached from it so
/// the set can stay untouched while the batch is in flight.
pub struct CommitPlan<R: PersistedRecord> {
    pub additions: Vec<R::Draft>,
    pub removals: Vec<RecordId>,
    pub updates: Vec<(RecordId, R::Patch)>,
}

impl<R: PersistedRecord> CommitPlan<R> {
    pub fn from_changes<K: Ord>(changes: &PendingChangeSet<K, R::Draft, R::Patch>) -> Self {
        Self {
            additions: changes.additions().map(|(_, draft)| draft.clone()).collect(),
            removals: changes.removals().collect(),
            updates: changes
                .updates()
                .map(|(id, patch)| (id, patch.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.additions.len() + self.removals.len() + self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a fully successful batch did, with created records carrying their new ids.
pub struct CommitOutcome<R: PersistedRecord> {
    pub created: Vec<R>,
    pub updated: Vec<(RecordId, R::Patch)>,
    pub deleted: Vec<RecordId>,
}

impl<R: PersistedRecord> CommitOutcome<R> {
    pub fn report(&self) -> CommitReport {
        CommitReport {
            created: self.created.len(),
            updated: self.updated.len(),
            deleted: self.deleted.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CommitReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

enum Settled {
    Created { index: usize, id: RecordId },
    Updated,
    Deleted,
}

/// Issues every operation of `plan` concurrently and waits for all of them.
///
/// Any rejected operation turns the whole batch into `CommitFailed`; operations
/// that already succeeded are not rolled back.
pub async fn execute_commit<R, S>(
    store: Arc<S>,
    plan: CommitPlan<R>,
) -> Result<CommitOutcome<R>, InfraError>
where
    R: PersistedRecord,
    S: RecordStore<R> + ?Sized + 'static,
{
    let total = plan.len();
    let CommitPlan {
        additions,
        removals,
        updates,
    } = plan;
    let mut operations: JoinSet<Result<Settled, InfraError>> = JoinSet::new();

    for id in removals.iter().copied() {
        let store = Arc::clone(&store);
        operations.spawn(async move { store.delete_by_id(id).await.map(|()| Settled::Deleted) });
    }
    for (index, draft) in additions.iter().cloned().enumerate() {
        let store = Arc::clone(&store);
        operations.spawn(async move {
            store
                .create(draft)
                .await
                .map(|id| Settled::Created { index, id })
        });
    }
    for (id, patch) in updates.iter().cloned() {
        let store = Arc::clone(&store);
        operations.spawn(async move { store.update(id, patch).await.map(|()| Settled::Updated) });
    }

    let mut created_ids: Vec<Option<RecordId>> = vec![None; additions.len()];
    let mut failures = Vec::new();
    while let Some(joined) = operations.join_next().await {
        match joined {
            Ok(Ok(Settled::Created { index, id })) => {
                if let Some(slot) = created_ids.get_mut(index) {
                    *slot = Some(id);
                }
            }
            Ok(Ok(Settled::Updated | Settled::Deleted)) => {}
            Ok(Err(error)) => failures.push(error.to_string()),
            Err(error) => failures.push(format!("failed to join store operation: {error}")),
        }
    }

    if !failures.is_empty() {
        return Err(InfraError::CommitFailed {
            failed: failures.len(),
            total,
            details: failures,
        });
    }

    let created = additions
        .into_iter()
        .zip(created_ids)
        .filter_map(|(draft, id)| id.map(|id| R::from_draft(id, draft)))
        .collect();
    Ok(CommitOutcome {
        created,
        updated: updates,
        deleted: removals,
    })
}
