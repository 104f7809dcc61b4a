use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// A single attempt at executing a task. `attempt` is 1-based and counts prior
/// runs for the same task_id.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskRun {
    pub id: String,
    pub task_id: String,
    pub worker_id: String,
    pub attempt: i64,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub worktree_path: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub python_env_used: String,
    #[serde(default)]
    pub metrics: HashMap<String, Value>,
}

impl TaskRun {
    pub fn new(id: String, task_id: String, worker_id: String, attempt: i64, started_at: String) -> Self {
        Self {
            id,
            task_id,
            worker_id,
            attempt,
            started_at,
            ended_at: None,
            exit_code: None,
            worktree_path: String::new(),
            branch_name: String::new(),
            commit_sha: String::new(),
            python_env_used: String::new(),
            metrics: HashMap::new(),
        }
    }

    pub fn apply_patch(&mut self, patch: RunPatch) {
        if let Some(v) = patch.ended_at {
            self.ended_at = v;
        }
        if let Some(v) = patch.exit_code {
            self.exit_code = v;
        }
        if let Some(v) = patch.worktree_path {
            self.worktree_path = v;
        }
        if let Some(v) = patch.branch_name {
            self.branch_name = v;
        }
        if let Some(v) = patch.commit_sha {
            self.commit_sha = v;
        }
        if let Some(v) = patch.python_env_used {
            self.python_env_used = v;
        }
        if let Some(v) = patch.metrics {
            self.metrics.extend(v);
        }
    }
}

/// Partial update applied to a run. `None` leaves the field untouched;
/// `metrics` is merged rather than replaced.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub ended_at: Option<Option<String>>,
    pub exit_code: Option<Option<i32>>,
    pub worktree_path: Option<String>,
    pub branch_name: Option<String>,
    pub commit_sha: Option<String>,
    pub python_env_used: Option<String>,
    pub metrics: Option<HashMap<String, Value>>,
}
