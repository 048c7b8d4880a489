use crate::application::attendance_editor::AttendanceEditor;
use crate::application::block_editor::{
    execute_block_commit, BlockCommitOutcome, BlockCommitPreparation, BlockEditor,
};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::commit::{execute_commit, CommitReport};
use crate::domain::attendance_staging::{AttendanceBulkAction, AttendanceBulkCriteria};
use crate::domain::block_staging::{BlockBulkAction, BlockBulkCriteria};
use crate::domain::calendar::{parse_date, parse_weekday, weekday_index};
use crate::domain::change_set::PendingCounts;
use crate::domain::conflicts::{AttendanceConflict, ConflictResolution};
use crate::domain::effective_state::{AttendanceCellState, BlockCellState};
use crate::domain::models::{
    AttendanceKey, AttendanceType, BlockDraft, PersistedRecord, Practice, PracticeDraft,
    PracticeId,
};
use crate::infrastructure::config::{read_staging_defaults, StagingDefaults};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use crate::infrastructure::sqlite_store::SqliteRecordStore;
use chrono::{NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    store: Arc<SqliteRecordStore>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self {
            store: Arc::new(SqliteRecordStore::new(&bootstrap.database_path)),
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        let message = error.to_string();
        self.log_error(command, &message);
        message
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });
        let path = self.logs_dir.join("commands.log");
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{payload}");
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    session: Option<EditingSession>,
    practices: Vec<Practice>,
    commit_in_progress: bool,
}

struct EditingSession {
    attendance: AttendanceEditor<SqliteRecordStore>,
    blocks: BlockEditor<SqliteRecordStore>,
    defaults: StagingDefaults,
}

impl EditingSession {
    fn pending_total(&self) -> usize {
        self.attendance.pending_counts().total() + self.blocks.pending_counts().total()
    }
}

impl RuntimeState {
    fn session(&self) -> Result<&EditingSession, InfraError> {
        self.session.as_ref().ok_or(InfraError::NoSession)
    }

    fn session_mut(&mut self) -> Result<&mut EditingSession, InfraError> {
        self.session.as_mut().ok_or(InfraError::NoSession)
    }

    /// Staging is refused while a commit batch is in flight.
    fn editable_session(&mut self) -> Result<&mut EditingSession, InfraError> {
        if self.commit_in_progress {
            return Err(InfraError::CommitInProgress);
        }
        self.session_mut()
    }
}

/// Holds `commit_in_progress` for one commit batch. Dropping it before
/// `settle` clears the flag.
struct CommitInFlight<'a> {
    state: &'a AppState,
    armed: bool,
}

impl<'a> CommitInFlight<'a> {
    fn begin(state: &'a AppState, commit_in_progress: &mut bool) -> Self {
        *commit_in_progress = true;
        Self { state, armed: true }
    }

    /// Clears the flag under a lock the caller already holds.
    fn settle(mut self, runtime: &mut RuntimeState) {
        runtime.commit_in_progress = false;
        self.armed = false;
    }
}

impl Drop for CommitInFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut runtime = self
            .state
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        runtime.commit_in_progress = false;
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub practices: usize,
    pub attendance_records: usize,
    pub blocks: usize,
    pub discarded_pending: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttendanceDayState {
    pub date: NaiveDate,
    /// Grid column, Sunday = 0.
    pub weekday: u32,
    pub state: AttendanceCellState,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlockDayState {
    pub date: NaiveDate,
    pub weekday: u32,
    pub state: BlockCellState,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkApplyResponse {
    pub days_visited: usize,
    pub pending: PendingCounts,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingCountsResponse {
    pub attendance: PendingCounts,
    pub blocks: PendingCounts,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceBulkRequest {
    pub action: String,
    pub practice_id: PracticeId,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub weekdays: Option<Vec<String>>,
    #[serde(default)]
    pub attendance_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockBulkRequest {
    pub action: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub weekdays: Option<Vec<String>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Loads practices, attendance and blocks into a fresh editing session,
/// replacing any session that was open.
pub async fn open_session_impl(state: &AppState) -> Result<SessionSummary, InfraError> {
    if lock_runtime(state)?.commit_in_progress {
        return Err(InfraError::CommitInProgress);
    }

    let defaults = read_staging_defaults(state.config_dir())?;
    let practices = RecordStore::<Practice>::list_all(&*state.store).await?;
    let attendance = AttendanceEditor::load(Arc::clone(&state.store)).await?;
    let blocks = BlockEditor::load(Arc::clone(&state.store), defaults.block_reason.clone()).await?;

    let summary = {
        let mut runtime = lock_runtime(state)?;
        if runtime.commit_in_progress {
            return Err(InfraError::CommitInProgress);
        }
        let summary = SessionSummary {
            practices: practices.len(),
            attendance_records: attendance.snapshot().len(),
            blocks: blocks.snapshot().len(),
            discarded_pending: runtime
                .session
                .as_ref()
                .map(EditingSession::pending_total)
                .unwrap_or(0),
        };
        runtime.practices = practices;
        runtime.session = Some(EditingSession {
            attendance,
            blocks,
            defaults,
        });
        summary
    };

    state.log_info(
        "open_session",
        &format!(
            "loaded practices={} attendance={} blocks={} discarded_pending={}",
            summary.practices, summary.attendance_records, summary.blocks, summary.discarded_pending
        ),
    );
    Ok(summary)
}

pub async fn create_practice_impl(
    state: &AppState,
    name: String,
    location: Option<String>,
) -> Result<Practice, InfraError> {
    let draft = PracticeDraft {
        name: name.trim().to_string(),
        location: location
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
    };
    draft.validate().map_err(InfraError::InvalidConfig)?;

    let id = RecordStore::<Practice>::create(&*state.store, draft.clone()).await?;
    let practice = Practice::from_draft(id, draft);

    {
        let mut runtime = lock_runtime(state)?;
        runtime.practices.push(practice.clone());
        runtime
            .practices
            .sort_by(|left, right| left.name.cmp(&right.name).then(left.id.cmp(&right.id)));
    }

    state.log_info(
        "create_practice",
        &format!("created practice_id={} name={}", practice.id, practice.name),
    );
    Ok(practice)
}

pub async fn list_practices_impl(state: &AppState) -> Result<Vec<Practice>, InfraError> {
    let practices = RecordStore::<Practice>::list_all(&*state.store).await?;
    lock_runtime(state)?.practices = practices.clone();
    Ok(practices)
}

pub fn toggle_attendance_impl(
    state: &AppState,
    date: String,
    practice_id: PracticeId,
) -> Result<AttendanceCellState, InfraError> {
    let key = AttendanceKey::new(parse_input_date(&date, "date")?, practice_id);
    let cell_state = {
        let mut runtime = lock_runtime(state)?;
        runtime.editable_session()?.attendance.toggle_cell(key)
    };
    state.log_info(
        "toggle_attendance",
        &format!("date={} practice_id={practice_id} state={cell_state:?}", key.date),
    );
    Ok(cell_state)
}

pub fn toggle_block_impl(state: &AppState, date: String) -> Result<BlockCellState, InfraError> {
    let date = parse_input_date(&date, "date")?;
    let cell_state = {
        let mut runtime = lock_runtime(state)?;
        runtime.editable_session()?.blocks.toggle_cell(date)
    };
    state.log_info("toggle_block", &format!("date={date} state={cell_state:?}"));
    Ok(cell_state)
}

pub fn attendance_state_impl(
    state: &AppState,
    date: String,
    practice_id: PracticeId,
) -> Result<AttendanceCellState, InfraError> {
    let key = AttendanceKey::new(parse_input_date(&date, "date")?, practice_id);
    let runtime = lock_runtime(state)?;
    Ok(runtime.session()?.attendance.effective_state(&key))
}

pub fn block_state_impl(state: &AppState, date: String) -> Result<BlockCellState, InfraError> {
    let date = parse_input_date(&date, "date")?;
    let runtime = lock_runtime(state)?;
    Ok(runtime.session()?.blocks.effective_state(date))
}

/// Effective attendance states for every day of the month containing `month`.
pub fn attendance_month_impl(
    state: &AppState,
    practice_id: PracticeId,
    month: String,
) -> Result<Vec<AttendanceDayState>, InfraError> {
    let month_date = parse_input_date(&month, "month")?;
    let runtime = lock_runtime(state)?;
    Ok(runtime
        .session()?
        .attendance
        .month_states(practice_id, month_date)
        .into_iter()
        .map(|(date, state)| AttendanceDayState {
            date,
            weekday: weekday_index(date),
            state,
        })
        .collect())
}

pub fn block_month_impl(state: &AppState, month: String) -> Result<Vec<BlockDayState>, InfraError> {
    let month_date = parse_input_date(&month, "month")?;
    let runtime = lock_runtime(state)?;
    Ok(runtime
        .session()?
        .blocks
        .month_states(month_date)
        .into_iter()
        .map(|(date, state)| BlockDayState {
            date,
            weekday: weekday_index(date),
            state,
        })
        .collect())
}

pub fn apply_attendance_bulk_impl(
    state: &AppState,
    request: AttendanceBulkRequest,
) -> Result<BulkApplyResponse, InfraError> {
    let action = AttendanceBulkAction::parse(&request.action).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "action must be select or deselect, got '{}'",
            request.action
        ))
    })?;
    let (start_date, end_date) = parse_input_range(&request.start_date, &request.end_date)?;
    let attendance_type = parse_optional_attendance_type(request.attendance_type.as_deref())?;

    let response = {
        let mut runtime = lock_runtime(state)?;
        let session = runtime.editable_session()?;
        let criteria = AttendanceBulkCriteria {
            action,
            practice_id: request.practice_id,
            start_date,
            end_date,
            weekdays: resolve_weekdays(request.weekdays.as_deref(), &session.defaults.weekdays)?,
            attendance_type: attendance_type.or(session.defaults.attendance_type),
        };
        BulkApplyResponse {
            days_visited: session.attendance.apply_bulk(&criteria),
            pending: session.attendance.pending_counts(),
        }
    };

    state.log_info(
        "apply_attendance_bulk",
        &format!(
            "action={action:?} practice_id={} range={start_date}..{end_date} days_visited={} pending={}",
            request.practice_id,
            response.days_visited,
            response.pending.total()
        ),
    );
    Ok(response)
}

pub fn apply_block_bulk_impl(
    state: &AppState,
    request: BlockBulkRequest,
) -> Result<BulkApplyResponse, InfraError> {
    let action = BlockBulkAction::parse(&request.action).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "action must be block or unblock, got '{}'",
            request.action
        ))
    })?;
    let (start_date, end_date) = parse_input_range(&request.start_date, &request.end_date)?;

    let response = {
        let mut runtime = lock_runtime(state)?;
        let session = runtime.editable_session()?;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(session.blocks.default_reason())
            .to_string();
        let criteria = BlockBulkCriteria {
            action,
            start_date,
            end_date,
            weekdays: resolve_weekdays(request.weekdays.as_deref(), &session.defaults.weekdays)?,
            reason,
        };
        BulkApplyResponse {
            days_visited: session.blocks.apply_bulk(&criteria),
            pending: session.blocks.pending_counts(),
        }
    };

    state.log_info(
        "apply_block_bulk",
        &format!(
            "action={action:?} range={start_date}..{end_date} days_visited={} pending={}",
            response.days_visited,
            response.pending.total()
        ),
    );
    Ok(response)
}

/// Persisted attendance that a block over `[start_date, end_date]` would invalidate.
pub fn detect_conflicts_impl(
    state: &AppState,
    start_date: String,
    end_date: String,
) -> Result<Vec<AttendanceConflict>, InfraError> {
    let (start_date, end_date) = parse_input_range(&start_date, &end_date)?;
    let conflicts = {
        let runtime = lock_runtime(state)?;
        let session = runtime.session()?;
        let candidate = BlockDraft {
            start_date,
            end_date,
            reason: session.blocks.default_reason().to_string(),
        };
        session
            .blocks
            .detect_conflicts(&candidate, &session.attendance, &runtime.practices)
    };
    state.log_info(
        "detect_conflicts",
        &format!("range={start_date}..{end_date} conflicts={}", conflicts.len()),
    );
    Ok(conflicts)
}

pub fn staged_conflicts_impl(state: &AppState) -> Result<Vec<AttendanceConflict>, InfraError> {
    let runtime = lock_runtime(state)?;
    let session = runtime.session()?;
    Ok(session
        .blocks
        .staged_conflicts(&session.attendance, &runtime.practices))
}

pub async fn commit_attendance_impl(state: &AppState) -> Result<CommitReport, InfraError> {
    let (store, plan, in_flight) = {
        let mut runtime = lock_runtime(state)?;
        let session = runtime.editable_session()?;
        let (store, plan) = (session.attendance.store(), session.attendance.commit_plan());
        let in_flight = CommitInFlight::begin(state, &mut runtime.commit_in_progress);
        (store, plan, in_flight)
    };
    let operations = plan.len();

    let executed = execute_commit(store, plan).await;
    let report = {
        let mut runtime = lock_runtime(state)?;
        in_flight.settle(&mut runtime);
        let outcome = executed?;
        runtime.session_mut()?.attendance.finish_commit(outcome)
    };

    state.log_info(
        "commit_attendance",
        &format!(
            "committed operations={operations} created={} updated={} deleted={}",
            report.created, report.updated, report.deleted
        ),
    );
    Ok(report)
}

/// Commits staged blocks. `resolution` is `cancel` or `remove` and only
/// matters when a staged block overlaps persisted attendance.
pub async fn commit_blocks_impl(
    state: &AppState,
    resolution: Option<String>,
) -> Result<BlockCommitOutcome, InfraError> {
    let resolution = match resolution.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => Some(ConflictResolution::parse(raw).ok_or_else(|| {
            InfraError::InvalidConfig(format!("resolution must be cancel or remove, got '{raw}'"))
        })?),
        None => None,
    };

    let prepared = {
        let mut runtime = lock_runtime(state)?;
        let RuntimeState {
            session,
            practices,
            commit_in_progress,
        } = &mut *runtime;
        if *commit_in_progress {
            return Err(InfraError::CommitInProgress);
        }
        let session = session.as_mut().ok_or(InfraError::NoSession)?;
        match session
            .blocks
            .prepare_commit(&session.attendance, practices, resolution)
        {
            BlockCommitPreparation::Conflicts(conflicts) => {
                state.log_info(
                    "commit_blocks",
                    &format!("commit gated by conflicts={}", conflicts.len()),
                );
                return Ok(BlockCommitOutcome::ConflictsFound { conflicts });
            }
            BlockCommitPreparation::Cancelled { discarded } => {
                state.log_info(
                    "commit_blocks",
                    &format!("cancelled block staging discarded_additions={discarded}"),
                );
                return Ok(BlockCommitOutcome::Cancelled { discarded });
            }
            BlockCommitPreparation::Ready { blocks, attendance } => (
                session.blocks.store(),
                blocks,
                session.attendance.store(),
                attendance,
                CommitInFlight::begin(state, commit_in_progress),
            ),
        }
    };

    let (block_store, block_plan, attendance_store, attendance_plan, in_flight) = prepared;
    let executed =
        execute_block_commit(block_store, block_plan, attendance_store, attendance_plan).await;
    let outcome = {
        let mut runtime = lock_runtime(state)?;
        in_flight.settle(&mut runtime);
        let (blocks, attendance) = executed?;
        let session = runtime.session_mut()?;
        let blocks = session.blocks.finish_commit(blocks);
        let attendance = attendance.map(|outcome| session.attendance.finish_commit(outcome));
        BlockCommitOutcome::Committed { blocks, attendance }
    };

    if let BlockCommitOutcome::Committed { blocks, attendance } = &outcome {
        state.log_info(
            "commit_blocks",
            &format!(
                "committed blocks created={} deleted={} attendance_deleted={}",
                blocks.created,
                blocks.deleted,
                attendance.map(|report| report.deleted).unwrap_or(0)
            ),
        );
    }
    Ok(outcome)
}

pub fn revert_attendance_impl(state: &AppState) -> Result<PendingCounts, InfraError> {
    let discarded = {
        let mut runtime = lock_runtime(state)?;
        runtime.editable_session()?.attendance.revert()
    };
    state.log_info(
        "revert_attendance",
        &format!("discarded pending={}", discarded.total()),
    );
    Ok(discarded)
}

pub fn revert_blocks_impl(state: &AppState) -> Result<PendingCounts, InfraError> {
    let discarded = {
        let mut runtime = lock_runtime(state)?;
        runtime.editable_session()?.blocks.revert()
    };
    state.log_info(
        "revert_blocks",
        &format!("discarded pending={}", discarded.total()),
    );
    Ok(discarded)
}

pub fn pending_counts_impl(state: &AppState) -> Result<PendingCountsResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    let session = runtime.session()?;
    let attendance = session.attendance.pending_counts();
    let blocks = session.blocks.pending_counts();
    Ok(PendingCountsResponse {
        attendance,
        blocks,
        total: attendance.total() + blocks.total(),
    })
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

fn parse_input_date(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    parse_date(value, field_name).map_err(InfraError::InvalidConfig)
}

fn parse_input_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate), InfraError> {
    let start_date = parse_input_date(start, "start_date")?;
    let end_date = parse_input_date(end, "end_date")?;
    if start_date > end_date {
        return Err(InfraError::InvalidConfig(
            "start_date must not be after end_date".to_string(),
        ));
    }
    Ok((start_date, end_date))
}

fn parse_optional_attendance_type(raw: Option<&str>) -> Result<Option<AttendanceType>, InfraError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    AttendanceType::parse(raw).map(Some).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "attendance_type must be full_day or half_day, got '{raw}'"
        ))
    })
}

fn resolve_weekdays(
    requested: Option<&[String]>,
    defaults: &HashSet<Weekday>,
) -> Result<HashSet<Weekday>, InfraError> {
    let Some(requested) = requested else {
        return Ok(defaults.clone());
    };
    let weekdays = requested
        .iter()
        .map(|value| {
            parse_weekday(value)
                .ok_or_else(|| InfraError::InvalidConfig(format!("invalid weekday '{value}'")))
        })
        .collect::<Result<HashSet<_>, _>>()?;
    if weekdays.is_empty() {
        return Err(InfraError::InvalidConfig(
            "weekdays must not be empty".to_string(),
        ));
    }
    Ok(weekdays)
}
