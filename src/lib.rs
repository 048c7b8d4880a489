pub mod application;
pub mod domain;
pub mod infrastructure;

use application::block_editor::BlockCommitOutcome;
use application::bootstrap::bootstrap_workspace;
use application::commands::{
    apply_attendance_bulk_impl, apply_block_bulk_impl, attendance_month_impl,
    attendance_state_impl, block_month_impl, block_state_impl, commit_attendance_impl,
    commit_blocks_impl, create_practice_impl, detect_conflicts_impl, list_practices_impl,
    open_session_impl, pending_counts_impl, revert_attendance_impl, revert_blocks_impl,
    staged_conflicts_impl, toggle_attendance_impl, toggle_block_impl,
};
use application::commit::CommitReport;
use domain::change_set::PendingCounts;
use domain::conflicts::AttendanceConflict;
use domain::effective_state::{AttendanceCellState, BlockCellState};
use domain::models::{Practice, PracticeId};
use serde::Serialize;
use std::path::PathBuf;

pub use application::commands::{
    AppState, AttendanceBulkRequest, AttendanceDayState, BlockBulkRequest, BlockDayState,
    BulkApplyResponse, PendingCountsResponse, SessionSummary,
};
pub use infrastructure::error::InfraError;

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub database_path: String,
}

/// Prepares a workspace at `root`, or at the current directory when omitted.
pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

pub async fn open_session(state: &AppState) -> Result<SessionSummary, String> {
    open_session_impl(state)
        .await
        .map_err(|error| state.command_error("open_session", &error))
}

pub async fn create_practice(
    state: &AppState,
    name: String,
    location: Option<String>,
) -> Result<Practice, String> {
    create_practice_impl(state, name, location)
        .await
        .map_err(|error| state.command_error("create_practice", &error))
}

pub async fn list_practices(state: &AppState) -> Result<Vec<Practice>, String> {
    list_practices_impl(state)
        .await
        .map_err(|error| state.command_error("list_practices", &error))
}

pub fn toggle_attendance(
    state: &AppState,
    date: String,
    practice_id: PracticeId,
) -> Result<AttendanceCellState, String> {
    toggle_attendance_impl(state, date, practice_id)
        .map_err(|error| state.command_error("toggle_attendance", &error))
}

pub fn toggle_block(state: &AppState, date: String) -> Result<BlockCellState, String> {
    toggle_block_impl(state, date).map_err(|error| state.command_error("toggle_block", &error))
}

pub fn attendance_state(
    state: &AppState,
    date: String,
    practice_id: PracticeId,
) -> Result<AttendanceCellState, String> {
    attendance_state_impl(state, date, practice_id)
        .map_err(|error| state.command_error("attendance_state", &error))
}

pub fn block_state(state: &AppState, date: String) -> Result<BlockCellState, String> {
    block_state_impl(state, date).map_err(|error| state.command_error("block_state", &error))
}

pub fn attendance_month(
    state: &AppState,
    practice_id: PracticeId,
    month: String,
) -> Result<Vec<AttendanceDayState>, String> {
    attendance_month_impl(state, practice_id, month)
        .map_err(|error| state.command_error("attendance_month", &error))
}

pub fn block_month(state: &AppState, month: String) -> Result<Vec<BlockDayState>, String> {
    block_month_impl(state, month).map_err(|error| state.command_error("block_month", &error))
}

pub fn apply_attendance_bulk(
    state: &AppState,
    request: AttendanceBulkRequest,
) -> Result<BulkApplyResponse, String> {
    apply_attendance_bulk_impl(state, request)
        .map_err(|error| state.command_error("apply_attendance_bulk", &error))
}

pub fn apply_block_bulk(
    state: &AppState,
    request: BlockBulkRequest,
) -> Result<BulkApplyResponse, String> {
    apply_block_bulk_impl(state, request)
        .map_err(|error| state.command_error("apply_block_bulk", &error))
}

pub fn detect_conflicts(
    state: &AppState,
    start_date: String,
    end_date: String,
) -> Result<Vec<AttendanceConflict>, String> {
    detect_conflicts_impl(state, start_date, end_date)
        .map_err(|error| state.command_error("detect_conflicts", &error))
}

pub fn staged_conflicts(state: &AppState) -> Result<Vec<AttendanceConflict>, String> {
    staged_conflicts_impl(state).map_err(|error| state.command_error("staged_conflicts", &error))
}

pub async fn commit_attendance(state: &AppState) -> Result<CommitReport, String> {
    commit_attendance_impl(state)
        .await
        .map_err(|error| state.command_error("commit_attendance", &error))
}

pub async fn commit_blocks(
    state: &AppState,
    resolution: Option<String>,
) -> Result<BlockCommitOutcome, String> {
    commit_blocks_impl(state, resolution)
        .await
        .map_err(|error| state.command_error("commit_blocks", &error))
}

pub fn revert_attendance(state: &AppState) -> Result<PendingCounts, String> {
    revert_attendance_impl(state).map_err(|error| state.command_error("revert_attendance", &error))
}

pub fn revert_blocks(state: &AppState) -> Result<PendingCounts, String> {
    revert_blocks_impl(state).map_err(|error| state.command_error("revert_blocks", &error))
}

pub fn pending_counts(state: &AppState) -> Result<PendingCountsResponse, String> {
    pending_counts_impl(state).map_err(|error| state.command_error("pending_counts", &error))
}
