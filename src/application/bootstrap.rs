use crate::infrastructure::config::{ensure_default_configs, load_configs};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "ledger.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Lays out `config/`, `state/` and `logs/` under `workspace_root`, writes
/// missing default configs and brings the database schema up to date.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    for dir in [&config_dir, &state_dir, &logs_dir] {
        fs::create_dir_all(dir)?;
    }

    ensure_default_configs(&config_dir)?;
    load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_layout_and_is_repeatable() {
        let root = std::env::temp_dir().join(format!(
            "practice-ledger-bootstrap-tests-{}",
            std::process::id()
        ));

        let first = bootstrap_workspace(&root).expect("first bootstrap");
        let second = bootstrap_workspace(&root).expect("second bootstrap");

        assert_eq!(first.database_path, root.join("state").join(DATABASE_FILE));
        assert_eq!(first.database_path, second.database_path);
        assert!(first.config_dir.join("staging.json").exists());
        assert!(first.logs_dir.is_dir());

        let _ = fs::remove_dir_all(&root);
    }
}
