pub mod scheduler;
pub mod task_executor;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use repopilot_db::models::{Task, TaskStatus};
use repopilot_db::Store;
use repopilot_deployment::Deployment;
use repopilot_executors::AgentRunner;
use repopilot_utils::{ExecMode, Settings};

pub use scheduler::Scheduler;
pub use task_executor::TaskExecutor;

/// The local, single-process deployment: a JSON-file `Store`, an `AgentRunner`
/// driving `claude` subprocesses, a `TaskExecutor` translating task state into
/// PLAN/EXEC dispatch, and a `Scheduler` running it all on a fixed worker
/// pool plus a janitor thread.
pub struct LocalDeployment {
    store: Arc<Store>,
    executor: Arc<TaskExecutor>,
    scheduler: std::sync::Mutex<Scheduler>,
}

impl LocalDeployment {
    /// Build the deployment and start its worker pool + janitor immediately.
    pub fn start(settings: &Settings) -> Self {
        std::fs::create_dir_all(settings.state_dir()).ok();
        std::fs::create_dir_all(settings.worktrees_dir()).ok();
        std::fs::create_dir_all(settings.artifacts_dir()).ok();

        let store = Arc::new(Store::new(settings.state_dir()));
        if let Err(e) = store.rescan_repos(&settings.repos_dir()) {
            tracing::warn!(error = %e, "startup rescan_repos failed");
        }

        let runner = Arc::new(AgentRunner::new());
        let executor = Arc::new(TaskExecutor::new(store.clone(), runner.clone(), settings.worktrees_dir(), settings.artifacts_dir()));

        let mut scheduler = Scheduler::new(store.clone(), runner, executor.clone(), settings.workers, settings.logs_retention_days);
        scheduler.start();

        Self { store, executor, scheduler: std::sync::Mutex::new(scheduler) }
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.executor.worktrees_dir().to_path_buf()
    }
}

impl Drop for LocalDeployment {
    fn drop(&mut self) {
        #[allow(clippy::expect_used)]
        self.scheduler.lock().expect("scheduler mutex poisoned").stop();
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    fn store(&self) -> &Store {
        &self.store
    }

    fn request_cancel(&self, task_id: &str) {
        #[allow(clippy::expect_used)]
        self.scheduler.lock().expect("scheduler mutex poisoned").request_cancel(task_id);
    }

    async fn cleanup_task_worktree_on_done(&self, task: &Task) -> anyhow::Result<bool> {
        self.executor.cleanup_exec_worktree_for_task(task, TaskStatus::Done)
    }

    fn exec_mode(&self) -> ExecMode {
        repopilot_utils::exec_mode::current()
    }

    fn set_exec_mode(&self, mode: ExecMode) {
        repopilot_utils::exec_mode::set(mode);
    }
}
