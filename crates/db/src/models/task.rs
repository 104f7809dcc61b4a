use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

use super::strategy::ExecStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, TS)]
pub enum TaskStatus {
    #[strum(serialize = "TODO")]
    Todo,
    #[strum(serialize = "PLAN_RUNNING")]
    PlanRunning,
    #[strum(serialize = "PLAN_REVIEW")]
    PlanReview,
    #[strum(serialize = "READY")]
    Ready,
    #[strum(serialize = "RUNNING")]
    Running,
    #[strum(serialize = "REVIEW")]
    Review,
    #[strum(serialize = "DONE")]
    Done,
    #[strum(serialize = "FAILED")]
    Failed,
    #[strum(serialize = "CANCELLED")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, TS)]
pub enum TaskMode {
    #[strum(serialize = "PLAN")]
    Plan,
    #[strum(serialize = "EXEC")]
    Exec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, TS)]
pub enum PermissionMode {
    #[strum(serialize = "BYPASS")]
    Bypass,
    #[strum(serialize = "DEFAULT")]
    Default,
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::Bypass
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct PlanQuestionOption {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct PlanQuestion {
    pub id: String,
    pub title: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<PlanQuestionOption>,
    #[serde(default)]
    pub recommended_option_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct PlanResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub questions: Vec<PlanQuestion>,
    #[serde(default)]
    pub recommended_prompt: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub valid_json: bool,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub validation: String,
    #[serde(default)]
    pub rollback: String,
    #[serde(default)]
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub new_dependencies: Vec<String>,
    #[serde(default)]
    pub estimated_time: String,
}

/// A unit of work tracked through the TODO -> ... -> DONE/FAILED/CANCELLED lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Task {
    pub id: String,
    pub repo_id: String,
    pub title: String,
    pub prompt: String,
    pub mode: TaskMode,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default)]
    pub priority: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub current_run_id: Option<String>,
    #[serde(default)]
    pub claude_session_id: Option<String>,
    #[serde(default)]
    pub plan_result: Option<PlanResult>,
    #[serde(default)]
    pub plan_answers: HashMap<String, String>,
    #[serde(default)]
    pub exec_strategy: Option<ExecStrategy>,
    #[serde(default)]
    pub pr_url: String,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Written by `claim_next_task`; internal diagnostic metadata, not part
    /// of the type this crate exports to frontend tooling.
    #[serde(default)]
    #[ts(skip)]
    pub worker_id: String,
}

impl Task {
    pub fn new(id: String, input: TaskCreateInput, now: String) -> Self {
        Self {
            id,
            repo_id: input.repo_id,
            title: input.title,
            prompt: input.prompt,
            mode: input.mode,
            status: TaskStatus::Todo,
            permission_mode: input.permission_mode,
            priority: input.priority,
            created_at: now.clone(),
            updated_at: now,
            current_run_id: None,
            claude_session_id: None,
            plan_result: None,
            plan_answers: HashMap::new(),
            exec_strategy: None,
            pr_url: String::new(),
            error_code: String::new(),
            error_message: String::new(),
            cancel_requested: false,
            worker_id: String::new(),
        }
    }

    /// Apply a patch in place. Does not touch `updated_at`; the store refreshes
    /// that itself so every mutation path (including internal ones like claim)
    /// gets it for free.
    pub fn apply_patch(&mut self, patch: TaskPatch) {
        if let Some(v) = patch.title {
            self.title = v;
        }
        if let Some(v) = patch.prompt {
            self.prompt = v;
        }
        if let Some(v) = patch.mode {
            self.mode = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = patch.priority {
            self.priority = v;
        }
        if let Some(v) = patch.current_run_id {
            self.current_run_id = v;
        }
        if let Some(v) = patch.claude_session_id {
            self.claude_session_id = v;
        }
        if let Some(v) = patch.plan_result {
            self.plan_result = v;
        }
        if let Some(v) = patch.plan_answers {
            self.plan_answers = v;
        }
        if let Some(v) = patch.exec_strategy {
            self.exec_strategy = v;
        }
        if let Some(v) = patch.pr_url {
            self.pr_url = v;
        }
        if let Some(v) = patch.error_code {
            self.error_code = v;
        }
        if let Some(v) = patch.error_message {
            self.error_message = v;
        }
        if let Some(v) = patch.cancel_requested {
            self.cancel_requested = v;
        }
        if let Some(v) = patch.worker_id {
            self.worker_id = v;
        }
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct TaskCreateInput {
    pub repo_id: String,
    pub title: String,
    pub prompt: String,
    #[serde(default = "default_create_mode")]
    pub mode: TaskMode,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default)]
    pub priority: i64,
}

fn default_create_mode() -> TaskMode {
    TaskMode::Plan
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct TaskRetryInput {
    pub reset_mode: Option<TaskMode>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct PlanConfirmInput {
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct PlanReviseInput {
    pub feedback: String,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct PlanBatchConfirmInput {
    #[serde(default)]
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct PlanBatchReviseInput {
    #[serde(default)]
    pub task_ids: Vec<String>,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct BatchTaskFailure {
    pub task_id: String,
    pub error_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
pub struct PlanBatchActionResult {
    pub updated: Vec<Task>,
    pub failed: Vec<BatchTaskFailure>,
    pub counts: HashMap<String, usize>,
}

/// Partial update applied to a task. Every field is optional; `None` leaves
/// the existing value untouched, matching the store contract's "null values
/// ignored" rule. `updated_at` is always refreshed by the store regardless of
/// which fields are set.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub mode: Option<TaskMode>,
    pub status: Option<TaskStatus>,
    pub priority: Option<i64>,
    pub current_run_id: Option<Option<String>>,
    pub claude_session_id: Option<Option<String>>,
    pub plan_result: Option<Option<PlanResult>>,
    pub plan_answers: Option<HashMap<String, String>>,
    pub exec_strategy: Option<Option<ExecStrategy>>,
    pub pr_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub cancel_requested: Option<bool>,
    pub worker_id: Option<String>,
}

impl TaskPatch {
    pub fn clear_error() -> Self {
        Self {
            error_code: Some(String::new()),
            error_message: Some(String::new()),
            cancel_requested: Some(false),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct BoardResponse {
    pub columns: HashMap<String, Vec<Task>>,
    pub counts: HashMap<String, usize>,
}
