use std::path::{Path, PathBuf};

/// Filesystem layout under `state_dir`:
/// `repos.json`, `tasks.json`, `runs.json`, `notifications.json`,
/// `logs/<task_id>.ndjson`, `locks/<name>.lock`, `artifacts/<task_id>/<run_id>/...`.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub state_dir: PathBuf,
}

impl StorePaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { state_dir: state_dir.into() }
    }

    pub fn repos_file(&self) -> PathBuf {
        self.state_dir.join("repos.json")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.state_dir.join("tasks.json")
    }

    pub fn runs_file(&self) -> PathBuf {
        self.state_dir.join("runs.json")
    }

    pub fn notifications_file(&self) -> PathBuf {
        self.state_dir.join("notifications.json")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn task_log_file(&self, task_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{task_id}.ndjson"))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir.join("artifacts")
    }

    pub fn task_artifact_dir(&self, task_id: &str, run_id: &str) -> PathBuf {
        self.artifacts_dir().join(task_id).join(run_id)
    }
}

pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
