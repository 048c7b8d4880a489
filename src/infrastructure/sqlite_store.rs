use crate::domain::models::{
    AttendanceDraft, AttendancePatch, AttendanceRecord, AttendanceType, BlockDraft, Practice,
    PracticeDraft, PracticePatch, RecordId, RecordKind, ScheduleBlock,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, ErrorCode};
use std::convert::Infallible;
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// SQLite-backed store for attendance, blocks and practices.
///
/// Every operation opens its own connection on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    async fn run<T, F>(&self, work: F) -> Result<T, InfraError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, InfraError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open_connection(&db_path)?;
            work(&connection)
        })
        .await
        .map_err(|error| InfraError::Join(format!("sqlite task failed: {error}")))?
    }
}

struct AttendanceRow {
    id: RecordId,
    practice_id: i64,
    date: String,
    attendance_type: String,
    check_in_time: Option<String>,
    check_out_time: Option<String>,
    notes: Option<String>,
}

impl AttendanceRow {
    fn into_record(self) -> Result<AttendanceRecord, InfraError> {
        let attendance_type = AttendanceType::parse(&self.attendance_type).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "invalid attendance.attendance_type '{}' for id={}",
                self.attendance_type, self.id
            ))
        })?;
        Ok(AttendanceRecord {
            id: self.id,
            practice_id: self.practice_id,
            date: parse_stored_date(&self.date, "attendance.date")?,
            attendance_type,
            check_in_time: parse_stored_time(self.check_in_time.as_deref(), "attendance.check_in_time")?,
            check_out_time: parse_stored_time(self.check_out_time.as_deref(), "attendance.check_out_time")?,
            notes: self.notes,
        })
    }
}

fn parse_stored_date(raw: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {field_name} '{raw}': {error}")))
}

fn parse_stored_time(raw: Option<&str>, field_name: &str) -> Result<Option<NaiveTime>, InfraError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(Some)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {field_name} '{raw}': {error}")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_time(time: Option<NaiveTime>) -> Option<String> {
    time.map(|value| value.format(TIME_FORMAT).to_string())
}

fn ensure_changed(changed: usize, kind: RecordKind, id: RecordId) -> Result<(), InfraError> {
    if changed == 0 {
        return Err(InfraError::NotFound { kind, id });
    }
    Ok(())
}

#[async_trait]
impl RecordStore<AttendanceRecord> for SqliteRecordStore {
    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, InfraError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT id, practice_id, date, attendance_type, check_in_time, check_out_time, notes
                 FROM attendance
                 ORDER BY date, practice_id, id",
            )?;
            let rows = statement
                .query_map([], |row| {
                    Ok(AttendanceRow {
                        id: row.get(0)?,
                        practice_id: row.get(1)?,
                        date: row.get(2)?,
                        attendance_type: row.get(3)?,
                        check_in_time: row.get(4)?,
                        check_out_time: row.get(5)?,
                        notes: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(AttendanceRow::into_record).collect()
        })
        .await
    }

    async fn create(&self, draft: AttendanceDraft) -> Result<RecordId, InfraError> {
        draft.validate().map_err(InfraError::InvalidConfig)?;
        let key = draft.key();
        self.run(move |connection| {
            connection
                .execute(
                    "INSERT INTO attendance
                       (practice_id, date, attendance_type, check_in_time, check_out_time, notes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        draft.practice_id,
                        format_date(draft.date),
                        draft.resolved_type().as_str(),
                        format_time(draft.check_in_time),
                        format_time(draft.check_out_time),
                        draft.notes,
                    ],
                )
                .map_err(|error| match error {
                    rusqlite::Error::SqliteFailure(failure, _)
                        if failure.code == ErrorCode::ConstraintViolation =>
                    {
                        InfraError::Duplicate {
                            kind: RecordKind::Attendance,
                            key: key.to_string(),
                        }
                    }
                    other => InfraError::Sqlite(other),
                })?;
            Ok(connection.last_insert_rowid())
        })
        .await
    }

    async fn update(&self, id: RecordId, patch: AttendancePatch) -> Result<(), InfraError> {
        self.run(move |connection| {
            let changed = connection.execute(
                "UPDATE attendance
                 SET attendance_type = COALESCE(?1, attendance_type)
                 WHERE id = ?2",
                params![patch.attendance_type.map(AttendanceType::as_str), id],
            )?;
            ensure_changed(changed, RecordKind::Attendance, id)
        })
        .await
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), InfraError> {
        self.run(move |connection| {
            let changed = connection.execute("DELETE FROM attendance WHERE id = ?1", params![id])?;
            ensure_changed(changed, RecordKind::Attendance, id)
        })
        .await
    }
}

#[async_trait]
impl RecordStore<ScheduleBlock> for SqliteRecordStore {
    async fn list_all(&self) -> Result<Vec<ScheduleBlock>, InfraError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT id, start_date, end_date, reason
                 FROM schedule_blocks
                 ORDER BY start_date, id",
            )?;
            let rows = statement
                .query_map([], |row| {
                    Ok((
                        row.get::<_, RecordId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(id, start_date, end_date, reason)| {
                    Ok(ScheduleBlock {
                        id,
                        start_date: parse_stored_date(&start_date, "schedule_blocks.start_date")?,
                        end_date: parse_stored_date(&end_date, "schedule_blocks.end_date")?,
                        reason,
                    })
                })
                .collect()
        })
        .await
    }

    async fn create(&self, draft: BlockDraft) -> Result<RecordId, InfraError> {
        draft.validate().map_err(InfraError::InvalidConfig)?;
        self.run(move |connection| {
            connection.execute(
                "INSERT INTO schedule_blocks (start_date, end_date, reason) VALUES (?1, ?2, ?3)",
                params![
                    format_date(draft.start_date),
                    format_date(draft.end_date),
                    draft.reason,
                ],
            )?;
            Ok(connection.last_insert_rowid())
        })
        .await
    }

    async fn update(&self, _id: RecordId, patch: Infallible) -> Result<(), InfraError> {
        match patch {}
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), InfraError> {
        self.run(move |connection| {
            let changed =
                connection.execute("DELETE FROM schedule_blocks WHERE id = ?1", params![id])?;
            ensure_changed(changed, RecordKind::Block, id)
        })
        .await
    }
}

#[async_trait]
impl RecordStore<Practice> for SqliteRecordStore {
    async fn list_all(&self) -> Result<Vec<Practice>, InfraError> {
        self.run(|connection| {
            let mut statement =
                connection.prepare("SELECT id, name, location FROM practices ORDER BY name, id")?;
            let practices = statement
                .query_map([], |row| {
                    Ok(Practice {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        location: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(practices)
        })
        .await
    }

    async fn create(&self, draft: PracticeDraft) -> Result<RecordId, InfraError> {
        draft.validate().map_err(InfraError::InvalidConfig)?;
        self.run(move |connection| {
            connection.execute(
                "INSERT INTO practices (name, location) VALUES (?1, ?2)",
                params![draft.name.trim(), draft.location],
            )?;
            Ok(connection.last_insert_rowid())
        })
        .await
    }

    async fn update(&self, id: RecordId, patch: PracticePatch) -> Result<(), InfraError> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(InfraError::InvalidConfig(
                    "practice.name must not be empty".to_string(),
                ));
            }
        }
        self.run(move |connection| {
            let changed = connection.execute(
                "UPDATE practices
                 SET name = COALESCE(?1, name), location = COALESCE(?2, location)
                 WHERE id = ?3",
                params![patch.name.as_deref().map(str::trim), patch.location, id],
            )?;
            ensure_changed(changed, RecordKind::Practice, id)
        })
        .await
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), InfraError> {
        self.run(move |connection| {
            let changed = connection.execute("DELETE FROM practices WHERE id = ?1", params![id])?;
            ensure_changed(changed, RecordKind::Practice, id)
        })
        .await
    }
}
