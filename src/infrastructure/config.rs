use crate::domain::calendar::{parse_weekday, weekday_name};
use crate::domain::models::AttendanceType;
use crate::infrastructure::error::InfraError;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const STAGING_JSON: &str = "staging.json";
const DEFAULT_BLOCK_REASON: &str = "Unavailable";
const DEFAULT_WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub staging: serde_json::Value,
}

/// Values the command layer falls back to when a request leaves them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDefaults {
    pub weekdays: HashSet<Weekday>,
    pub attendance_type: Option<AttendanceType>,
    pub block_reason: String,
}

impl Default for StagingDefaults {
    fn default() -> Self {
        Self {
            weekdays: DEFAULT_WEEKDAYS.into_iter().collect(),
            attendance_type: None,
            block_reason: DEFAULT_BLOCK_REASON.to_string(),
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "PracticeLedger"
            }),
        ),
        (
            STAGING_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultWeekdays": DEFAULT_WEEKDAYS.map(weekday_name),
                "defaultAttendanceType": null,
                "defaultBlockReason": DEFAULT_BLOCK_REASON
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if path.exists() {
            continue;
        }
        let formatted = serde_json::to_string_pretty(&value)?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    match parsed.get("schema").and_then(serde_json::Value::as_u64) {
        Some(1) => Ok(parsed),
        Some(schema) => Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        ))),
        None => Err(InfraError::InvalidConfig(format!(
            "missing schema in {}",
            path.display()
        ))),
    }
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        staging: read_config(&config_dir.join(STAGING_JSON))?,
    })
}

/// Reads `staging.json`, substituting built-in defaults for absent or blank keys.
pub fn read_staging_defaults(config_dir: &Path) -> Result<StagingDefaults, InfraError> {
    let path = config_dir.join(STAGING_JSON);
    let staging = read_config(&path)?;
    let mut defaults = StagingDefaults::default();

    if let Some(values) = staging
        .get("defaultWeekdays")
        .and_then(serde_json::Value::as_array)
    {
        let mut weekdays = HashSet::new();
        for value in values {
            let weekday = value.as_str().and_then(parse_weekday).ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "invalid defaultWeekdays entry {} in {}",
                    value,
                    path.display()
                ))
            })?;
            weekdays.insert(weekday);
        }
        if !weekdays.is_empty() {
            defaults.weekdays = weekdays;
        }
    }

    if let Some(raw) = staging
        .get("defaultAttendanceType")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let attendance_type = AttendanceType::parse(raw).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "invalid defaultAttendanceType '{}' in {}",
                raw,
                path.display()
            ))
        })?;
        defaults.attendance_type = Some(attendance_type);
    }

    if let Some(reason) = staging
        .get("defaultBlockReason")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        defaults.block_reason = reason.to_string();
    }

    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "practice-ledger-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_written_once_and_loadable() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        fs::write(
            dir.path.join(APP_JSON),
            "{\"schema\":1,\"appName\":\"Custom\"}\n",
        )
        .expect("overwrite app config");
        ensure_default_configs(&dir.path).expect("second pass");

        let bundle = load_configs(&dir.path).expect("load configs");
        assert_eq!(bundle.app["appName"], "Custom");
        assert_eq!(bundle.staging["defaultBlockReason"], DEFAULT_BLOCK_REASON);
    }

    #[test]
    fn staging_defaults_fall_back_to_weekdays_and_unavailable() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");

        let defaults = read_staging_defaults(&dir.path).expect("read defaults");
        assert_eq!(defaults, StagingDefaults::default());
        assert_eq!(defaults.weekdays.len(), 5);
        assert!(!defaults.weekdays.contains(&Weekday::Sat));
    }

    #[test]
    fn staging_defaults_honour_overrides() {
        let dir = TempConfigDir::new();
        fs::write(
            dir.path.join(STAGING_JSON),
            r#"{"schema":1,"defaultWeekdays":["sat","Sunday"],"defaultAttendanceType":"half_day","defaultBlockReason":" Leave "}"#,
        )
        .expect("write staging config");

        let defaults = read_staging_defaults(&dir.path).expect("read defaults");
        assert_eq!(
            defaults.weekdays,
            HashSet::from([Weekday::Sat, Weekday::Sun])
        );
        assert_eq!(defaults.attendance_type, Some(AttendanceType::HalfDay));
        assert_eq!(defaults.block_reason, "Leave");
    }

    #[test]
    fn unknown_schema_and_bad_weekday_are_rejected() {
        let dir = TempConfigDir::new();
        fs::write(dir.path.join(STAGING_JSON), r#"{"schema":2}"#).expect("write config");
        assert!(matches!(
            read_staging_defaults(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));

        fs::write(
            dir.path.join(STAGING_JSON),
            r#"{"schema":1,"defaultWeekdays":["Funday"]}"#,
        )
        .expect("write config");
        assert!(matches!(
            read_staging_defaults(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
