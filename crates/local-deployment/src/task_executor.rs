use std::path::{Path, PathBuf};

use repopilot_db::models::{
    utcnow_iso, NotificationType, PermissionMode, RepoConfig, RunPatch, Task, TaskEvent, TaskMode, TaskPatch, TaskStatus,
};
use repopilot_db::Store;
use repopilot_executors::{AgentOutcome, AgentRunner};
use repopilot_services::error::GitError;
use repopilot_services::{git, pr};
use repopilot_utils::env_probe::select_default_conda_env;
use repopilot_utils::exec_mode;
use regex::Regex;
use secrecy::SecretString;

/// Per-task execution dispatch: PLAN mode streaming + plan parsing, EXEC
/// FIXED mode (runner owns the git pipeline), EXEC AGENTIC mode (the agent
/// owns it, prompted to do so), and worktree cleanup once a run's terminal
/// state is known.
pub struct TaskExecutor {
    store: std::sync::Arc<Store>,
    runner: std::sync::Arc<AgentRunner>,
    worktrees_dir: PathBuf,
    artifacts_dir: PathBuf,
}

impl TaskExecutor {
    pub fn new(store: std::sync::Arc<Store>, runner: std::sync::Arc<AgentRunner>, worktrees_dir: PathBuf, artifacts_dir: PathBuf) -> Self {
        Self { store, runner, worktrees_dir, artifacts_dir }
    }

    pub fn worktrees_dir(&self) -> &std::path::Path {
        &self.worktrees_dir
    }

    /// Entry point invoked by a scheduler worker once it has claimed `task`.
    pub async fn run_task(&self, task: &Task, worker_id: &str) -> anyhow::Result<()> {
        let selected_env = select_default_conda_env().unwrap_or_else(|| "none".to_string());
        tracing::info!(task_id = %task.id, worker_id, mode = %task.mode, env = %selected_env, "run start");

        let run = self.store.create_run(&task.id, worker_id)?;
        self.store.update_run(&run.id, RunPatch { python_env_used: Some(selected_env), ..Default::default() })?;

        match task.mode {
            TaskMode::Plan => self.run_plan(task, &run.id).await,
            TaskMode::Exec => match exec_mode::current() {
                repopilot_utils::ExecMode::Fixed => self.run_exec_fixed(task, &run.id).await,
                repopilot_utils::ExecMode::Agentic => self.run_exec_agentic(task, &run.id).await,
            },
        }
    }

    fn finish_run(&self, run_id: &str, exit_code: i32, commit_sha: Option<String>) -> anyhow::Result<()> {
        self.store.update_run(
            run_id,
            RunPatch {
                ended_at: Some(Some(utcnow_iso())),
                exit_code: Some(Some(exit_code)),
                commit_sha,
                ..Default::default()
            },
        )?;
        Ok(())
    }

    fn mark_cancelled(&self, task: &Task, run_id: &str, reason: &str) -> anyhow::Result<()> {
        self.store.update_task(
            &task.id,
            TaskPatch {
                status: Some(TaskStatus::Cancelled),
                error_code: Some("CANCELLED".to_string()),
                error_message: Some(reason.to_string()),
                current_run_id: Some(Some(run_id.to_string())),
                ..Default::default()
            },
        )?;
        self.store.create_notification(&task.id, NotificationType::Info, &format!("任务已取消: {}", task.title), reason)?;
        Ok(())
    }

    fn mark_failed(&self, task: &Task, run_id: &str, code: &str, message: &str) -> anyhow::Result<()> {
        self.store.update_task(
            &task.id,
            TaskPatch {
                status: Some(TaskStatus::Failed),
                error_code: Some(code.to_string()),
                error_message: Some(message.to_string()),
                current_run_id: Some(Some(run_id.to_string())),
                ..Default::default()
            },
        )?;
        let body: String = message.chars().take(500).collect();
        self.store.create_notification(&task.id, NotificationType::Error, &format!("任务失败: {}", task.title), &body)?;
        Ok(())
    }

    fn mark_review(&self, task: &Task, run_id: &str, pr_url: &str) -> anyhow::Result<()> {
        self.store.update_task(
            &task.id,
            TaskPatch {
                status: Some(TaskStatus::Review),
                pr_url: Some(pr_url.to_string()),
                error_code: Some(String::new()),
                error_message: Some(String::new()),
                current_run_id: Some(Some(run_id.to_string())),
                cancel_requested: Some(false),
                ..Default::default()
            },
        )?;
        self.store.create_notification(&task.id, NotificationType::Success, &format!("任务进入 Review: {}", task.title), pr_url)?;
        Ok(())
    }

    // --------------------------------------------------------------- plan

    async fn run_plan(&self, task: &Task, run_id: &str) -> anyhow::Result<()> {
        let Some(repo) = self.store.get_repo(&task.repo_id)? else {
            tracing::error!(task_id = %task.id, repo_id = %task.repo_id, "plan failed: repo not found");
            self.finish_run(run_id, 1, None)?;
            self.mark_failed(task, run_id, "REPO_NOT_FOUND", &format!("Repo not found: {}", task.repo_id))?;
            return Ok(());
        };

        let repo_path = Path::new(&repo.root_path);
        self.store.update_run(run_id, RunPatch { worktree_path: Some(repo_path.to_string_lossy().into_owned()), ..Default::default() })?;

        let prompt = repopilot_db::plan::plan_prompt(&task.prompt);
        let outcome = self.stream(task, &prompt, repo_path).await?;

        if outcome.cancelled {
            self.finish_run(run_id, outcome.exit_code, None)?;
            self.mark_cancelled(task, run_id, "任务在 Plan 阶段被取消")?;
            return Ok(());
        }
        if outcome.exit_code != 0 {
            self.finish_run(run_id, outcome.exit_code, None)?;
            self.mark_failed(task, run_id, "PLAN_EXIT_NONZERO", &format!("Claude exited with code {}", outcome.exit_code))?;
            return Ok(());
        }

        let parsed = repopilot_db::plan::parse_plan(&outcome.text);
        self.store.update_task(
            &task.id,
            TaskPatch {
                status: Some(TaskStatus::PlanReview),
                plan_result: Some(Some(parsed)),
                error_code: Some(String::new()),
                error_message: Some(String::new()),
                current_run_id: Some(Some(run_id.to_string())),
                ..Default::default()
            },
        )?;
        self.store.create_notification(
            &task.id,
            NotificationType::Info,
            &format!("Plan 待确认: {}", task.title),
            "请在任务详情中确认 Plan 选项后继续执行。",
        )?;
        self.finish_run(run_id, 0, None)?;
        Ok(())
    }

    // ------------------------------------------------------------ exec fixed

    async fn run_exec_fixed(&self, task: &Task, run_id: &str) -> anyhow::Result<()> {
        let Some(repo) = self.store.get_repo(&task.repo_id)? else {
            self.finish_run(run_id, 1, None)?;
            self.mark_failed(task, run_id, "REPO_NOT_FOUND", &format!("Repo not found: {}", task.repo_id))?;
            return Ok(());
        };

        let worktree = match self.create_worktree_for_run(&repo, task, run_id) {
            Ok(info) => info,
            Err(e) => {
                self.finish_run(run_id, 1, None)?;
                self.mark_failed(task, run_id, "GIT_PIPELINE_FAILED", &e.to_string())?;
                return Ok(());
            }
        };

        let result = self.run_exec_fixed_inner(task, run_id, &repo, &worktree).await;
        self.cleanup_on_terminal_outcome(task, run_id, true)?;
        result
    }

    async fn run_exec_fixed_inner(&self, task: &Task, run_id: &str, repo: &RepoConfig, worktree: &git::WorktreeInfo) -> anyhow::Result<()> {
        let baseline_commit = match git::current_commit(&worktree.path) {
            Ok(c) => c,
            Err(e) => {
                self.finish_run(run_id, 1, None)?;
                self.mark_failed(task, run_id, "GIT_PIPELINE_FAILED", &e.to_string())?;
                return Ok(());
            }
        };

        let outcome = self.stream(task, &task.prompt, &worktree.path).await?;
        self.store.append_event(&task.id, serde_json::to_value(TaskEvent::AssistantText { text: outcome.text.clone() })?)?;

        if outcome.cancelled {
            self.finish_run(run_id, outcome.exit_code, None)?;
            self.mark_cancelled(task, run_id, "任务在执行阶段被取消")?;
            return Ok(());
        }
        if outcome.exit_code != 0 {
            self.finish_run(run_id, outcome.exit_code, None)?;
            self.mark_failed(task, run_id, "EXEC_EXIT_NONZERO", &format!("Claude exited with code {}", outcome.exit_code))?;
            return Ok(());
        }
        if !git::has_material_changes(&worktree.path, &baseline_commit) {
            self.finish_run(run_id, 1, None)?;
            self.mark_failed(task, run_id, "NO_CHANGES", "Claude finished but produced no git changes")?;
            return Ok(());
        }

        if let Err(e) = self.run_git_pipeline(task, run_id, repo, worktree).await {
            self.finish_run(run_id, 1, None)?;
            let (code, message) = classify_git_error(&e);
            self.mark_failed(task, run_id, code, &message)?;
        }
        Ok(())
    }

    async fn run_git_pipeline(&self, task: &Task, run_id: &str, repo: &RepoConfig, worktree: &git::WorktreeInfo) -> Result<(), GitError> {
        let commit_sha = git::commit_all(&worktree.path, &format!("task({}): apply changes", task.id))?;
        self.store.update_run(run_id, RunPatch { commit_sha: Some(commit_sha.clone()), ..Default::default() }).ok();

        git::rebase_with_main(&worktree.path, &repo.main_branch)?;
        git::run_tests(&worktree.path, &repo.test_command, &repo.id, git::DEFAULT_TEST_TIMEOUT)?;
        git::push_branch(&worktree.path, &worktree.branch)?;

        let token = std::env::var("GITHUB_TOKEN").ok().map(SecretString::from);
        let pr_url = match pr::create_pr(repo, &worktree.branch, &format!("[{}] {}", task.id, task.title), "Automated by RepoPilot", token).await {
            Ok(url) => url,
            Err(GitError::PrCredentialsMissing(reason)) => {
                let compare_url = git::build_compare_url(&repo.github_repo, &repo.main_branch, &worktree.branch);
                if compare_url.is_empty() {
                    return Err(GitError::PrCredentialsMissing(reason));
                }
                self.store.append_event(&task.id, serde_json::json!({"type": "pr_fallback", "compare_url": compare_url, "reason": reason})).ok();
                compare_url
            }
            Err(e) => return Err(e),
        };

        self.mark_review(task, run_id, &pr_url).ok();
        self.finish_run(run_id, 0, Some(commit_sha)).ok();
        Ok(())
    }

    // ---------------------------------------------------------- exec agentic

    async fn run_exec_agentic(&self, task: &Task, run_id: &str) -> anyhow::Result<()> {
        let Some(repo) = self.store.get_repo(&task.repo_id)? else {
            self.finish_run(run_id, 1, None)?;
            self.mark_failed(task, run_id, "REPO_NOT_FOUND", &format!("Repo not found: {}", task.repo_id))?;
            return Ok(());
        };

        let worktree = match self.create_worktree_for_run(&repo, task, run_id) {
            Ok(info) => info,
            Err(e) => {
                self.finish_run(run_id, 1, None)?;
                self.mark_failed(task, run_id, "GIT_PIPELINE_FAILED", &e.to_string())?;
                return Ok(());
            }
        };

        let strategy = repopilot_db::strategy_builder::build_default_strategy(&repo);
        self.store.update_task(&task.id, TaskPatch { exec_strategy: Some(Some(strategy.clone())), ..Default::default() })?;
        self.store.append_event(&task.id, serde_json::to_value(TaskEvent::StrategyGenerated { template: strategy.template.clone() })?)?;

        let prompt = build_agentic_prompt(task, &repo, &worktree.branch);
        let outcome = self.stream(task, &prompt, &worktree.path).await?;
        self.store.append_event(&task.id, serde_json::to_value(TaskEvent::AssistantText { text: outcome.text.clone() })?)?;

        let result: anyhow::Result<()> = (|| {
            if outcome.cancelled {
                self.finish_run(run_id, outcome.exit_code, None)?;
                self.mark_cancelled(task, run_id, "任务在执行阶段被取消")?;
                return Ok(());
            }
            if outcome.exit_code != 0 {
                self.finish_run(run_id, outcome.exit_code, None)?;
                self.mark_failed(task, run_id, "EXEC_EXIT_NONZERO", &format!("Claude exited with code {}", outcome.exit_code))?;
                return Ok(());
            }

            let pr_url = extract_pr_url(&outcome.text, Some(&repo), &worktree.branch);
            self.mark_review(task, run_id, &pr_url)?;
            self.finish_run(run_id, 0, None)?;
            Ok(())
        })();

        if let Err(e) = &result {
            self.finish_run(run_id, 1, None).ok();
            self.mark_failed(task, run_id, "UNEXPECTED_ERROR", &e.to_string()).ok();
        }

        self.cleanup_on_terminal_outcome(task, run_id, true)?;
        Ok(())
    }

    // ------------------------------------------------------------- helpers

    async fn stream(&self, task: &Task, prompt: &str, workdir: &Path) -> anyhow::Result<AgentOutcome> {
        let conda_env = select_default_conda_env();
        Ok(self
            .runner
            .stream_claude(&self.store, task, prompt, workdir, repopilot_executors::runner::DEFAULT_TIMEOUT, conda_env.as_deref())
            .await?)
    }

    fn create_worktree_for_run(&self, repo: &RepoConfig, task: &Task, run_id: &str) -> Result<git::WorktreeInfo, GitError> {
        let info = git::create_worktree(repo, &self.worktrees_dir, &task.id, &task.title)?;
        self.store
            .update_run(
                run_id,
                RunPatch { worktree_path: Some(info.path.to_string_lossy().into_owned()), branch_name: Some(info.branch.clone()), ..Default::default() },
            )
            .ok();
        git::setup_isolated_data(&info.path, repo)?;
        Ok(info)
    }

    /// Snapshot-then-cleanup once a FIXED/AGENTIC run has reached a terminal
    /// state: only FAILED/CANCELLED get a forensic snapshot, since a
    /// successful run keeps its worktree alive until the user marks the task
    /// DONE.
    fn cleanup_on_terminal_outcome(&self, task: &Task, run_id: &str, snapshot_on_failure: bool) -> anyhow::Result<()> {
        let Some(task_after) = self.store.get_task(&task.id)? else { return Ok(()) };
        if matches!(task_after.status, TaskStatus::Failed | TaskStatus::Cancelled) {
            self.cleanup_exec_worktree_for_run(&task_after, run_id, task_after.status, snapshot_on_failure)?;
        }
        Ok(())
    }

    /// Invoked both from the failure/cancel path above and from the DONE
    /// HTTP handler (via `cleanup_exec_worktree_for_task`), always emitting a
    /// `worktree_cleanup` event describing the outcome.
    pub fn cleanup_exec_worktree_for_run(&self, task: &Task, run_id: &str, trigger_status: TaskStatus, snapshot_on_failure: bool) -> anyhow::Result<bool> {
        let Some(run) = self.store.get_run(run_id)? else {
            self.store.append_event(
                &task.id,
                serde_json::json!({"type": "worktree_cleanup", "trigger_status": trigger_status.to_string(), "result": "run_not_found", "run_id": run_id}),
            )?;
            return Ok(false);
        };

        if run.worktree_path.trim().is_empty() {
            self.store.append_event(
                &task.id,
                serde_json::json!({"type": "worktree_cleanup", "trigger_status": trigger_status.to_string(), "result": "skip_empty_path", "run_id": run_id}),
            )?;
            return Ok(true);
        }

        let Some(repo) = self.store.get_repo(&task.repo_id)? else {
            self.store.append_event(
                &task.id,
                serde_json::json!({"type": "worktree_cleanup", "trigger_status": trigger_status.to_string(), "result": "repo_not_found", "run_id": run_id}),
            )?;
            return Ok(false);
        };

        let worktree = PathBuf::from(&run.worktree_path);
        if snapshot_on_failure {
            match git::snapshot_worktree(&worktree, &self.artifacts_dir, &task.id, run_id) {
                Ok(snapshot) => {
                    self.store.update_run(
                        run_id,
                        RunPatch { metrics: Some([("artifact_path".to_string(), serde_json::json!(snapshot.to_string_lossy()))].into()), ..Default::default() },
                    )?;
                    self.store.append_event(&task.id, serde_json::to_value(TaskEvent::Artifact { path: snapshot.to_string_lossy().into_owned() })?)?;
                }
                Err(e) => tracing::warn!(task_id = %task.id, run_id, error = %e, "failed to save task artifact"),
            }
        }

        git::cleanup_worktree(&repo, &worktree, &run.branch_name);
        self.store.update_run(run_id, RunPatch { worktree_path: Some(String::new()), ..Default::default() })?;
        self.store.append_event(
            &task.id,
            serde_json::json!({
                "type": "worktree_cleanup",
                "trigger_status": trigger_status.to_string(),
                "result": "success",
                "run_id": run_id,
                "worktree_path": run.worktree_path,
                "branch_name": run.branch_name,
            }),
        )?;
        Ok(true)
    }

    /// Entry point for the DONE HTTP handler: cleans up the current run's
    /// worktree without a forensic snapshot (the task succeeded).
    pub fn cleanup_exec_worktree_for_task(&self, task: &Task, trigger_status: TaskStatus) -> anyhow::Result<bool> {
        if task.mode != TaskMode::Exec {
            return Ok(false);
        }
        let Some(run_id) = &task.current_run_id else {
            self.store.append_event(
                &task.id,
                serde_json::json!({"type": "worktree_cleanup", "trigger_status": trigger_status.to_string(), "result": "skip_no_current_run"}),
            )?;
            return Ok(false);
        };
        self.cleanup_exec_worktree_for_run(task, run_id, trigger_status, false)
    }
}

fn classify_git_error(e: &GitError) -> (&'static str, String) {
    match e {
        GitError::PrCredentialsMissing(msg) => ("GIT_PIPELINE_FAILED", msg.clone()),
        other => ("GIT_PIPELINE_FAILED", other.to_string()),
    }
}

/// Post-coding instructions appended to the task prompt in AGENTIC mode,
/// telling the agent how to finish the git side of the job itself.
fn build_agentic_prompt(task: &Task, repo: &RepoConfig, branch: &str) -> String {
    let main = &repo.main_branch;
    let test_cmd = repo.test_command.trim();
    let has_github = repo.github_repo.contains('/');

    let mut lines = vec![
        task.prompt.clone(),
        String::new(),
        "---".to_string(),
        "【编码完成后请自行执行以下步骤，使用终端命令完成】".to_string(),
        String::new(),
        "1. 提交变更:".to_string(),
        format!("   git add -A && git commit -m \"task({}): apply changes\"", task.id),
        String::new(),
        "2. 变基到主分支（若有冲突请解决后 git add 再 git rebase --continue）:".to_string(),
        format!("   git fetch origin {main} && git rebase origin/{main}"),
        String::new(),
    ];

    if !test_cmd.is_empty() {
        lines.push("3. 运行测试:".to_string());
        lines.push(format!("   {test_cmd}"));
        lines.push(String::new());
        lines.push("4. 推送当前分支:".to_string());
    } else {
        lines.push("3. 推送当前分支:".to_string());
    }
    lines.push(format!("   git push -u origin {branch}"));

    if has_github {
        lines.push(String::new());
        lines.push("5. 创建 PR（若 gh 可用）:".to_string());
        lines.push(format!(
            "   gh pr create --base {main} --head {branch} --title \"[{}] {}\" --body \"Automated by Claude Code Web Manager\"",
            task.id, task.title
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

fn pr_url_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    #[allow(clippy::unwrap_used)]
    PATTERN.get_or_init(|| Regex::new(r"https://github\.com/[^/\s]+/[^/\s]+/pull/\d+").unwrap())
}

/// First GitHub PR URL in the agent's output, falling back to a compare URL
/// when the agent never created one (no `gh`/token available to it either).
fn extract_pr_url(text: &str, repo: Option<&RepoConfig>, branch: &str) -> String {
    if let Some(m) = pr_url_pattern().find(text) {
        return m.as_str().to_string();
    }
    match repo {
        Some(repo) if repo.github_repo.contains('/') => git::build_compare_url(&repo.github_repo, &repo.main_branch, branch),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_pr_url_prefers_url_in_text() {
        let text = "done! see https://github.com/acme/widgets/pull/42 for the PR";
        assert_eq!(extract_pr_url(text, None, "branch"), "https://github.com/acme/widgets/pull/42");
    }

    #[test]
    fn extract_pr_url_falls_back_to_compare_url() {
        let repo = RepoConfig {
            id: "demo".to_string(),
            name: "demo".to_string(),
            root_path: "/tmp".to_string(),
            main_branch: "main".to_string(),
            test_command: String::new(),
            github_repo: "acme/widgets".to_string(),
            shared_symlink_paths: Vec::new(),
            forbidden_symlink_paths: Vec::new(),
            enabled: true,
        };
        let url = extract_pr_url("no links here", Some(&repo), "task/x");
        assert!(url.starts_with("https://github.com/acme/widgets/compare/main..."));
    }

    #[test]
    fn build_agentic_prompt_includes_test_step_only_when_configured() {
        let task = Task::new(
            "250101-001".to_string(),
            repopilot_db::models::TaskCreateInput {
                repo_id: "demo".to_string(),
                title: "t".to_string(),
                prompt: "do it".to_string(),
                mode: TaskMode::Exec,
                permission_mode: PermissionMode::Bypass,
                priority: 0,
            },
            utcnow_iso(),
        );
        let repo_with_tests = RepoConfig {
            id: "demo".to_string(),
            name: "demo".to_string(),
            root_path: "/tmp".to_string(),
            main_branch: "main".to_string(),
            test_command: "npm test".to_string(),
            github_repo: "acme/widgets".to_string(),
            shared_symlink_paths: Vec::new(),
            forbidden_symlink_paths: Vec::new(),
            enabled: true,
        };
        let prompt = build_agentic_prompt(&task, &repo_with_tests, "task/x");
        assert!(prompt.contains("运行测试"));
        assert!(prompt.contains("创建 PR"));
    }
}
