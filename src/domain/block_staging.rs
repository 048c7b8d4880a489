use crate::domain::calendar::qualifying_days;
use crate::domain::change_set::BlockChanges;
use crate::domain::effective_state::{block_cell_state, BlockCellState, BlockSnapshot};
use crate::domain::models::BlockDraft;
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockBulkAction {
    Block,
    Unblock,
}

impl BlockBulkAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "block" => Some(Self::Block),
            "unblock" => Some(Self::Unblock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBulkCriteria {
    pub action: BlockBulkAction,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekdays: HashSet<Weekday>,
    pub reason: String,
}

/// Flips a day between its persisted availability and the opposite, returning the new state.
pub fn toggle_block_cell(
    snapshot: &BlockSnapshot,
    changes: &mut BlockChanges,
    date: NaiveDate,
    reason: &str,
) -> BlockCellState {
    match block_cell_state(snapshot, changes, date) {
        BlockCellState::Unblocked => {
            changes.stage_addition(date, BlockDraft::single_day(date, reason));
        }
        BlockCellState::StagedBlockAddition => {
            changes.discard_addition(&date);
        }
        BlockCellState::EffectivelyBlocked => {
            for block in snapshot.covering(date) {
                changes.stage_removal(block.id);
            }
        }
        BlockCellState::StagedBlockRemoval => {
            for block in snapshot.covering(date) {
                changes.unstage_removal(block.id);
            }
        }
    }
    block_cell_state(snapshot, changes, date)
}

/// Blocks or unblocks every qualifying day and returns how many days qualified.
pub fn apply_block_bulk(
    snapshot: &BlockSnapshot,
    changes: &mut BlockChanges,
    criteria: &BlockBulkCriteria,
) -> usize {
    let mut visited = 0;
    for date in qualifying_days(criteria.start_date, criteria.end_date, &criteria.weekdays) {
        match criteria.action {
            BlockBulkAction::Block => {
                let mut covered = false;
                for block in snapshot.covering(date) {
                    changes.unstage_removal(block.id);
                    covered = true;
                }
                if !covered && !changes.has_addition(&date) {
                    changes.stage_addition(date, BlockDraft::single_day(date, criteria.reason.as_str()));
                }
            }
            BlockBulkAction::Unblock => {
                changes.discard_addition(&date);
                for block in snapshot.covering(date) {
                    changes.stage_removal(block.id);
                }
            }
        }
        visited += 1;
    }
    visited
}
