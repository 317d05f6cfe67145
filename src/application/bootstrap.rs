use crate::infrastructure::config::{ensure_default_configs, load_configs};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Creates `config/`, `state/` and `logs/` under `workspace_root`, writes the
/// default config files that are missing and applies the schema.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("planner.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        config_dir,
        logs_dir,
        database_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn bootstrap_is_idempotent() {
        let root = std::env::temp_dir().join(format!(
            "dayplanner-bootstrap-tests-{}-{}",
            std::process::id(),
            NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed)
        ));

        let first = bootstrap_workspace(&root).expect("first bootstrap");
        let second = bootstrap_workspace(&root).expect("second bootstrap");

        assert_eq!(first.database_path, second.database_path);
        assert_eq!(first.database_path, root.join("state").join("planner.sqlite"));
        assert_eq!(first.config_dir, root.join("config"));
        assert!(first.database_path.exists());
        assert!(first.config_dir.join("app.json").exists());
        assert!(first.config_dir.join("planner.json").exists());
        assert!(first.logs_dir.is_dir());
        let _ = fs::remove_dir_all(&root);
    }
}
