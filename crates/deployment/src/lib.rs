use async_trait::async_trait;
use repopilot_db::models::Task;
use repopilot_db::Store;
use repopilot_utils::ExecMode;

/// The surface the HTTP layer runs against: a handle to the store plus the
/// few scheduler/runner operations a thin REST handler needs to trigger.
/// `LocalDeployment` (in `repopilot-local-deployment`) is the only
/// implementation today; the trait exists so the server crate doesn't need
/// to know that.
#[async_trait]
pub trait Deployment: Send + Sync {
    fn store(&self) -> &Store;

    /// Forward a cancel request to whatever is currently running for
    /// `task_id`. A no-op if nothing is running.
    fn request_cancel(&self, task_id: &str);

    /// Clean up the worktree for a task's current run, for the DONE
    /// transition: no forensic snapshot (the task succeeded), and a no-op if
    /// the task isn't an EXEC task or has no live worktree.
    async fn cleanup_task_worktree_on_done(&self, task: &Task) -> anyhow::Result<bool>;

    fn exec_mode(&self) -> ExecMode;

    fn set_exec_mode(&self, mode: ExecMode);
}
