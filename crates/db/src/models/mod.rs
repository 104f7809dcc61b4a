pub mod event;
pub mod health;
pub mod notification;
pub mod repo;
pub mod run;
pub mod strategy;
pub mod task;

pub use event::{EventBatch, TaskEvent};
pub use health::HealthResponse;
pub use notification::{Notification, NotificationType};
pub use repo::{RepoConfig, RepoPatchInput, DEFAULT_TEST_COMMAND};
pub use run::{RunPatch, TaskRun};
pub use strategy::{ExecStrategy, StrategyDecision, StrategyStep, StrategyStepStatus, StrategyStepType};
pub use task::{
    BatchTaskFailure, BoardResponse, PermissionMode, PlanBatchActionResult, PlanBatchConfirmInput,
    PlanBatchReviseInput, PlanConfirmInput, PlanQuestion, PlanQuestionOption, PlanResult,
    PlanReviseInput, Task, TaskCreateInput, TaskMode, TaskPatch, TaskRetryInput, TaskStatus,
};

use chrono::Utc;

/// RFC 3339 timestamp in UTC, matching `datetime.now(timezone.utc).isoformat()`.
pub fn utcnow_iso() -> String {
    Utc::now().to_rfc3339()
}
