use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;

/// Store-assigned identifier of a persisted record.
pub type RecordId = i64;
pub type PracticeId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Attendance,
    Block,
    Practice,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Block => "block",
            Self::Practice => "practice",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceType {
    #[default]
    FullDay,
    HalfDay,
}

impl AttendanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullDay => "full_day",
            Self::HalfDay => "half_day",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full_day" | "fullday" | "full" => Some(Self::FullDay),
            "half_day" | "halfday" | "half" => Some(Self::HalfDay),
            _ => None,
        }
    }
}

/// Address of one attendance cell: a calendar day at one practice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttendanceKey {
    pub date: NaiveDate,
    pub practice_id: PracticeId,
}

impl AttendanceKey {
    pub fn new(date: NaiveDate, practice_id: PracticeId) -> Self {
        Self { date, practice_id }
    }
}

impl fmt::Display for AttendanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "date={} practice_id={}", self.date, self.practice_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub practice_id: PracticeId,
    pub date: NaiveDate,
    pub attendance_type: AttendanceType,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    pub fn key(&self) -> AttendanceKey {
        AttendanceKey::new(self.date, self.practice_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_check_times(self.check_in_time, self.check_out_time)
    }
}

/// Attendance entry staged in memory, not yet assigned a persisted id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceDraft {
    pub practice_id: PracticeId,
    pub date: NaiveDate,
    pub attendance_type: Option<AttendanceType>,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

impl AttendanceDraft {
    pub fn new(key: AttendanceKey, attendance_type: Option<AttendanceType>) -> Self {
        Self {
            practice_id: key.practice_id,
            date: key.date,
            attendance_type,
            check_in_time: None,
            check_out_time: None,
            notes: None,
        }
    }

    pub fn key(&self) -> AttendanceKey {
        AttendanceKey::new(self.date, self.practice_id)
    }

    /// Unset types are written as a full day.
    pub fn resolved_type(&self) -> AttendanceType {
        self.attendance_type.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_check_times(self.check_in_time, self.check_out_time)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendancePatch {
    pub attendance_type: Option<AttendanceType>,
}

impl AttendancePatch {
    pub fn attendance_type(attendance_type: AttendanceType) -> Self {
        Self {
            attendance_type: Some(attendance_type),
        }
    }
}

/// Inclusive closed date interval during which no attendance should be recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleBlock {
    pub id: RecordId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

impl ScheduleBlock {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_span(self.start_date, self.end_date, "block")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockDraft {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

impl BlockDraft {
    pub fn single_day(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            start_date: date,
            end_date: date,
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_span(self.start_date, self.end_date, "block")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Practice {
    pub id: PracticeId,
    pub name: String,
    pub location: Option<String>,
}

impl Practice {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "practice.name")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PracticeDraft {
    pub name: String,
    pub location: Option<String>,
}

impl PracticeDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "practice.name")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PracticePatch {
    pub name: Option<String>,
    pub location: Option<String>,
}

/// Ties a persisted record type to the shapes used to create and patch it.
pub trait PersistedRecord: Clone + Send + Sync + 'static {
    type Draft: Clone + Send + Sync + 'static;
    type Patch: Clone + Send + Sync + 'static;

    const KIND: RecordKind;

    fn id(&self) -> RecordId;
    fn from_draft(id: RecordId, draft: Self::Draft) -> Self;
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Natural key no two stored records of this kind may share.
    fn unique_key(&self) -> Option<String> {
        None
    }

    fn draft_unique_key(_draft: &Self::Draft) -> Option<String> {
        None
    }
}

impl PersistedRecord for AttendanceRecord {
    type Draft = AttendanceDraft;
    type Patch = AttendancePatch;

    const KIND: RecordKind = RecordKind::Attendance;

    fn id(&self) -> RecordId {
        self.id
    }

    fn from_draft(id: RecordId, draft: AttendanceDraft) -> Self {
        let attendance_type = draft.resolved_type();
        Self {
            id,
            practice_id: draft.practice_id,
            date: draft.date,
            attendance_type,
            check_in_time: draft.check_in_time,
            check_out_time: draft.check_out_time,
            notes: draft.notes,
        }
    }

    fn apply_patch(&mut self, patch: &AttendancePatch) {
        if let Some(attendance_type) = patch.attendance_type {
            self.attendance_type = attendance_type;
        }
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.key().to_string())
    }

    fn draft_unique_key(draft: &AttendanceDraft) -> Option<String> {
        Some(draft.key().to_string())
    }
}

// Blocks are only ever added or removed, so their patch type is uninhabited.
impl PersistedRecord for ScheduleBlock {
    type Draft = BlockDraft;
    type Patch = Infallible;

    const KIND: RecordKind = RecordKind::Block;

    fn id(&self) -> RecordId {
        self.id
    }

    fn from_draft(id: RecordId, draft: BlockDraft) -> Self {
        Self {
            id,
            start_date: draft.start_date,
            end_date: draft.end_date,
            reason: draft.reason,
        }
    }

    fn apply_patch(&mut self, patch: &Infallible) {
        match *patch {}
    }
}

impl PersistedRecord for Practice {
    type Draft = PracticeDraft;
    type Patch = PracticePatch;

    const KIND: RecordKind = RecordKind::Practice;

    fn id(&self) -> RecordId {
        self.id
    }

    fn from_draft(id: RecordId, draft: PracticeDraft) -> Self {
        Self {
            id,
            name: draft.name.trim().to_string(),
            location: draft.location,
        }
    }

    fn apply_patch(&mut self, patch: &PracticePatch) {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(location) = &patch.location {
            self.location = Some(location.clone());
        }
    }
}

/// Display name for a practice id, falling back to `Practice #<id>` when unknown.
pub fn practice_name(practices: &[Practice], practice_id: PracticeId) -> String {
    practices
        .iter()
        .find(|practice| practice.id == practice_id)
        .map(|practice| practice.name.clone())
        .unwrap_or_else(|| format!("Practice #{practice_id}"))
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_check_times(
    check_in_time: Option<NaiveTime>,
    check_out_time: Option<NaiveTime>,
) -> Result<(), String> {
    if let (Some(check_in), Some(check_out)) = (check_in_time, check_out_time) {
        if check_out < check_in {
            return Err("attendance.check_out_time must be >= attendance.check_in_time".to_string());
        }
    }
    Ok(())
}

fn validate_span(start: NaiveDate, end: NaiveDate, prefix: &str) -> Result<(), String> {
    if end < start {
        return Err(format!("{prefix}.end_date must be >= {prefix}.start_date"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn sample_attendance() -> AttendanceRecord {
        AttendanceRecord {
            id: 11,
            practice_id: 7,
            date: date("2024-03-01"),
            attendance_type: AttendanceType::FullDay,
            check_in_time: NaiveTime::from_hms_opt(8, 30, 0),
            check_out_time: NaiveTime::from_hms_opt(17, 0, 0),
            notes: Some("covering for Dr. Hale".to_string()),
        }
    }

    fn sample_block() -> ScheduleBlock {
        ScheduleBlock {
            id: 3,
            start_date: date("2024-01-01"),
            end_date: date("2024-01-05"),
            reason: "Conference".to_string(),
        }
    }

    #[test]
    fn attendance_validate_rejects_reverse_check_times() {
        let mut record = sample_attendance();
        assert!(record.validate().is_ok());
        record.check_out_time = NaiveTime::from_hms_opt(7, 0, 0);
        assert!(record.validate().is_err());
    }

    #[test]
    fn block_validate_rejects_inverted_span() {
        let mut block = sample_block();
        assert!(block.validate().is_ok());
        block.end_date = date("2023-12-31");
        assert!(block.validate().is_err());
    }

    #[test]
    fn block_covers_is_inclusive_on_both_ends() {
        let block = sample_block();
        assert!(block.covers(date("2024-01-01")));
        assert!(block.covers(date("2024-01-05")));
        assert!(!block.covers(date("2023-12-31")));
        assert!(!block.covers(date("2024-01-06")));
    }

    #[test]
    fn draft_without_type_is_created_as_full_day() {
        let draft = AttendanceDraft::new(AttendanceKey::new(date("2024-03-01"), 7), None);
        let record = AttendanceRecord::from_draft(42, draft);
        assert_eq!(record.id, 42);
        assert_eq!(record.attendance_type, AttendanceType::FullDay);
        assert_eq!(record.key(), AttendanceKey::new(date("2024-03-01"), 7));
    }

    #[test]
    fn attendance_patch_only_touches_set_fields() {
        let mut record = sample_attendance();
        record.apply_patch(&AttendancePatch::default());
        assert_eq!(record, sample_attendance());

        record.apply_patch(&AttendancePatch::attendance_type(AttendanceType::HalfDay));
        assert_eq!(record.attendance_type, AttendanceType::HalfDay);
        assert_eq!(record.notes, sample_attendance().notes);
    }

    #[test]
    fn practice_name_falls_back_to_id() {
        let practices = vec![Practice {
            id: 1,
            name: "Harbour Street".to_string(),
            location: None,
        }];
        assert_eq!(practice_name(&practices, 1), "Harbour Street");
        assert_eq!(practice_name(&practices, 9), "Practice #9");
    }

    #[test]
    fn attendance_type_parse_accepts_common_spellings() {
        assert_eq!(AttendanceType::parse("full_day"), Some(AttendanceType::FullDay));
        assert_eq!(AttendanceType::parse(" Half-Day "), Some(AttendanceType::HalfDay));
        assert_eq!(AttendanceType::parse("quarter"), None);
    }

    proptest! {
        #[test]
        fn attendance_keys_order_by_date_then_practice(
            left_day in 0i64..400,
            right_day in 0i64..400,
            left_practice in 0i64..50,
            right_practice in 0i64..50
        ) {
            let base = date("2024-01-01");
            let left = AttendanceKey::new(base + chrono::Duration::days(left_day), left_practice);
            let right = AttendanceKey::new(base + chrono::Duration::days(right_day), right_practice);
            let expected = (left.date, left.practice_id).cmp(&(right.date, right.practice_id));
            prop_assert_eq!(left.cmp(&right), expected);
        }
    }

    #[test]
    fn domain_models_support_serde_roundtrip() {
        let record = sample_attendance();
        let block = sample_block();

        let record_roundtrip: AttendanceRecord =
            serde_json::from_str(&serde_json::to_string(&record).expect("serialize attendance"))
                .expect("deserialize attendance");
        let block_roundtrip: ScheduleBlock =
            serde_json::from_str(&serde_json::to_string(&block).expect("serialize block"))
                .expect("deserialize block");

        assert_eq!(record_roundtrip, record);
        assert_eq!(block_roundtrip, block);
    }
}
