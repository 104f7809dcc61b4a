use std::env;
use std::path::{Path, PathBuf};

/// Default worker pool size. No environment override is wired; changing this
/// requires a code change (see the crate's open questions).
pub const DEFAULT_WORKERS: usize = 3;

/// Default per-task NDJSON log retention, in days.
pub const DEFAULT_LOGS_RETENTION_DAYS: i64 = 30;

/// Process-wide root-derived layout. `root_dir` is read from `REPOPILOT_ROOT`
/// at startup and defaults to the current working directory.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root_dir: PathBuf,
    pub workers: usize,
    pub logs_retention_days: i64,
}

impl Settings {
    pub fn load() -> Self {
        let root_dir = env::var_os("REPOPILOT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        Self {
            root_dir,
            workers: DEFAULT_WORKERS,
            logs_retention_days: DEFAULT_LOGS_RETENTION_DAYS,
        }
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.root_dir.join("repos")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root_dir.join("state")
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.root_dir.join("worktrees")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir().join("artifacts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn backend_log_path(&self) -> PathBuf {
        self.logs_dir().join("backend.log")
    }

    /// String-keyed view of the layout, as reported by `GET /api/health`.
    pub fn path_strings(&self) -> Vec<(&'static str, String)> {
        vec![
            ("root", display(&self.root_dir)),
            ("repos", display(&self.repos_dir())),
            ("state", display(&self.state_dir())),
            ("worktrees", display(&self.worktrees_dir())),
        ]
    }
}

fn display(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
