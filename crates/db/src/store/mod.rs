mod atomic;
mod collection;
mod id;
mod lock;
mod paths;
pub mod rescan;

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

pub use paths::StorePaths;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    utcnow_iso, BatchTaskFailure, BoardResponse, EventBatch, Notification, NotificationType,
    PlanBatchActionResult, RepoConfig, RepoPatchInput, RunPatch, Task, TaskCreateInput, TaskEvent,
    TaskMode, TaskPatch, TaskRun, TaskStatus,
};
use crate::plan;
use lock::FileLock;

/// A single-process JSON-file-backed store: repos/tasks/runs/notifications as
/// whole-file JSON arrays, events as per-task NDJSON logs. Every mutating
/// operation acquires the relevant named advisory lock, reads the current
/// file, mutates in memory, and writes the result back atomically.
#[derive(Debug, Clone)]
pub struct Store {
    paths: StorePaths,
}

impl Store {
    pub fn new(state_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { paths: StorePaths::new(state_dir) }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    // ---------------------------------------------------------------- repos

    pub fn list_repos(&self) -> StoreResult<Vec<RepoConfig>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "repos")?;
        Ok(collection::load(&self.paths.repos_file()))
    }

    pub fn get_repo(&self, id: &str) -> StoreResult<Option<RepoConfig>> {
        Ok(self.list_repos()?.into_iter().find(|r| r.id == id))
    }

    pub fn patch_repo(&self, id: &str, patch: RepoPatchInput) -> StoreResult<RepoConfig> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "repos")?;
        let mut repos: Vec<RepoConfig> = collection::load(&self.paths.repos_file());
        let repo = repos
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RepoNotFound(id.to_string()))?;
        repo.apply_patch(patch);
        let updated = repo.clone();
        collection::save(&self.paths.repos_file(), &repos)?;
        Ok(updated)
    }

    /// Scan `repos_dir` and merge qualifying repos into the store: fill
    /// missing fields on existing rows (keyed by absolute root path),
    /// migrate the legacy `npm test` command, and create new rows for
    /// previously-unseen repos with a disambiguated slug id.
    pub fn rescan_repos(&self, repos_dir: &Path) -> StoreResult<Vec<RepoConfig>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "repos")?;
        let mut repos: Vec<RepoConfig> = collection::load(&self.paths.repos_file());
        let scanned = rescan::scan(repos_dir);

        let mut existing_ids: HashSet<String> = repos.iter().map(|r| r.id.clone()).collect();

        for found in scanned {
            let root_path = found.root_path.to_string_lossy().into_owned();
            if let Some(repo) = repos.iter_mut().find(|r| r.root_path == root_path) {
                if repo.name.is_empty() {
                    repo.name = found.name.clone();
                }
                if repo.github_repo.is_empty() {
                    repo.github_repo = found.github_repo.clone();
                }
                let main_branch_is_stale = repo.main_branch.is_empty()
                    || !rescan::is_remote_tracking_branch(&found.root_path, &repo.main_branch);
                if main_branch_is_stale {
                    repo.main_branch = found.main_branch.clone();
                }
                if repo.test_command.trim() == "npm test" {
                    repo.test_command = crate::models::DEFAULT_TEST_COMMAND.to_string();
                }
                if repo.forbidden_symlink_paths.is_empty() {
                    repo.forbidden_symlink_paths = vec!["PROGRESS.md".to_string()];
                }
            } else {
                let mut candidate = rescan::slugify(&found.name);
                if existing_ids.contains(&candidate) {
                    let mut n = 2;
                    loop {
                        let next = format!("{candidate}-{n}");
                        if !existing_ids.contains(&next) {
                            candidate = next;
                            break;
                        }
                        n += 1;
                    }
                }
                existing_ids.insert(candidate.clone());
                repos.push(RepoConfig {
                    id: candidate,
                    name: found.name,
                    root_path,
                    main_branch: found.main_branch,
                    test_command: crate::models::DEFAULT_TEST_COMMAND.to_string(),
                    github_repo: found.github_repo,
                    shared_symlink_paths: Vec::new(),
                    forbidden_symlink_paths: vec!["PROGRESS.md".to_string()],
                    enabled: true,
                });
            }
        }

        collection::save(&self.paths.repos_file(), &repos)?;
        Ok(repos)
    }

    // ---------------------------------------------------------------- tasks

    pub fn create_task(&self, input: TaskCreateInput) -> StoreResult<Task> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
        let existing_ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let id = id::next_id(&existing_ids)?;
        let now = utcnow_iso();
        let task = Task::new(id, input, now);
        tasks.push(task.clone());
        collection::save(&self.paths.tasks_file(), &tasks)?;
        Ok(task)
    }

    pub fn list_tasks(
        &self,
        repo_id: Option<&str>,
        status: Option<TaskStatus>,
        keyword: Option<&str>,
    ) -> StoreResult<Vec<Task>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
        if let Some(repo_id) = repo_id {
            tasks.retain(|t| t.repo_id == repo_id);
        }
        if let Some(status) = status {
            tasks.retain(|t| t.status == status);
        }
        if let Some(keyword) = keyword {
            let needle = keyword.to_lowercase();
            tasks.retain(|t| {
                t.title.to_lowercase().contains(&needle) || t.prompt.to_lowercase().contains(&needle)
            });
        }
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(tasks)
    }

    pub fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
        Ok(tasks.into_iter().find(|t| t.id == id))
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> StoreResult<Task> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
        task.apply_patch(patch);
        task.updated_at = utcnow_iso();
        let updated = task.clone();
        collection::save(&self.paths.tasks_file(), &tasks)?;
        Ok(updated)
    }

    /// Direct cancel for TODO/READY/PLAN_REVIEW; sticky `cancel_requested`
    /// for RUNNING/PLAN_RUNNING (the scheduler/runner observe it and
    /// transition to CANCELLED once the subprocess actually stops).
    pub fn cancel_task(&self, id: &str) -> StoreResult<Task> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
        task.cancel_requested = true;
        if matches!(task.status, TaskStatus::Todo | TaskStatus::Ready | TaskStatus::PlanReview) {
            task.status = TaskStatus::Cancelled;
            task.error_code = "CANCELLED".to_string();
        }
        task.updated_at = utcnow_iso();
        let updated = task.clone();
        collection::save(&self.paths.tasks_file(), &tasks)?;
        Ok(updated)
    }

    pub fn reset_task_for_retry(&self, id: &str, mode: Option<TaskMode>) -> StoreResult<Task> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
        task.status = TaskStatus::Todo;
        task.mode = mode.unwrap_or(task.mode);
        task.cancel_requested = false;
        task.error_code = String::new();
        task.error_message = String::new();
        task.updated_at = utcnow_iso();
        let updated = task.clone();
        collection::save(&self.paths.tasks_file(), &tasks)?;
        Ok(updated)
    }

    /// Strip/dedup while preserving first-seen order; drops blank entries.
    pub fn normalize_task_ids(ids: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for raw in ids {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                out.push(trimmed.to_string());
            }
        }
        out
    }

    /// Atomic claim: select the highest-priority, oldest candidate in
    /// `(mode=PLAN ∧ TODO) ∪ (mode=EXEC ∧ {TODO,READY})` that isn't
    /// cancel-requested, and transition it to the corresponding *_RUNNING
    /// status under the tasks lock so two workers can never claim the same
    /// task.
    pub fn claim_next_task(&self, worker_id: &str) -> StoreResult<Option<Task>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
        let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());

        let mut candidate_idx: Option<usize> = None;
        for (idx, t) in tasks.iter().enumerate() {
            if t.cancel_requested {
                continue;
            }
            let claimable = matches!(
                (t.mode, t.status),
                (TaskMode::Plan, TaskStatus::Todo) | (TaskMode::Exec, TaskStatus::Todo) | (TaskMode::Exec, TaskStatus::Ready)
            );
            if !claimable {
                continue;
            }
            candidate_idx = Some(match candidate_idx {
                None => idx,
                Some(best) => {
                    let b = &tasks[best];
                    let t_is_better = t.priority > b.priority
                        || (t.priority == b.priority && t.created_at < b.created_at);
                    if t_is_better { idx } else { best }
                }
            });
        }

        let Some(idx) = candidate_idx else {
            return Ok(None);
        };

        let task = &mut tasks[idx];
        task.status = match task.mode {
            TaskMode::Plan => TaskStatus::PlanRunning,
            TaskMode::Exec => TaskStatus::Running,
        };
        task.worker_id = worker_id.to_string();
        task.updated_at = utcnow_iso();
        let claimed = task.clone();
        collection::save(&self.paths.tasks_file(), &tasks)?;
        Ok(Some(claimed))
    }

    pub fn batch_confirm_plan_tasks(&self, ids: &[String]) -> StoreResult<PlanBatchActionResult> {
        let normalized = Self::normalize_task_ids(ids);
        let mut result = PlanBatchActionResult::default();
        let mut confirmed_ids = Vec::new();

        {
            let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
            let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
            let mut changed = false;

            for id in &normalized {
                match Self::validate_plan_review(&tasks, id) {
                    Err(failure) => result.failed.push(failure),
                    Ok(_) => {
                        let task = tasks.iter_mut().find(|t| &t.id == id).expect("validated above");
                        let task_plan = task.plan_result.clone().expect("validated above");
                        let answers: std::collections::HashMap<String, String> = task_plan
                            .questions
                            .iter()
                            .filter_map(|q| q.recommended_option_key.clone().map(|k| (q.id.clone(), k)))
                            .collect();
                        let new_prompt = plan::build_exec_prompt(&task.prompt, &task_plan, &answers);
                        task.mode = TaskMode::Exec;
                        task.status = TaskStatus::Ready;
                        task.prompt = new_prompt;
                        task.plan_answers = answers;
                        task.cancel_requested = false;
                        task.error_code = String::new();
                        task.error_message = String::new();
                        task.updated_at = utcnow_iso();
                        result.updated.push(task.clone());
                        confirmed_ids.push(id.clone());
                        changed = true;
                    }
                }
            }

            if changed {
                collection::save(&self.paths.tasks_file(), &tasks)?;
            }
        }

        for id in &confirmed_ids {
            let _ = self.append_event(id, serde_json::to_value(TaskEvent::PlanBatchConfirm {})?);
        }

        result.counts.insert("requested".to_string(), normalized.len());
        result.counts.insert("updated".to_string(), result.updated.len());
        result.counts.insert("failed".to_string(), result.failed.len());
        Ok(result)
    }

    pub fn batch_revise_plan_tasks(&self, ids: &[String], feedback: &str) -> StoreResult<PlanBatchActionResult> {
        let normalized = Self::normalize_task_ids(ids);
        let mut result = PlanBatchActionResult::default();
        let mut revised_ids = Vec::new();

        {
            let _lock = FileLock::acquire(&self.paths.locks_dir(), "tasks")?;
            let mut tasks: Vec<Task> = collection::load(&self.paths.tasks_file());
            let mut changed = false;

            for id in &normalized {
                match Self::validate_plan_review(&tasks, id) {
                    Err(failure) => result.failed.push(failure),
                    Ok(_) => {
                        let task = tasks.iter_mut().find(|t| &t.id == id).expect("validated above");
                        task.prompt = format!("{}\n\n[用户反馈]\n{feedback}", task.prompt);
                        task.mode = TaskMode::Plan;
                        task.status = TaskStatus::Todo;
                        task.cancel_requested = false;
                        task.error_code = String::new();
                        task.error_message = String::new();
                        task.updated_at = utcnow_iso();
                        result.updated.push(task.clone());
                        revised_ids.push(id.clone());
                        changed = true;
                    }
                }
            }

            if changed {
                collection::save(&self.paths.tasks_file(), &tasks)?;
            }
        }

        for id in &revised_ids {
            let payload = TaskEvent::PlanBatchRevise { feedback: feedback.to_string() };
            let _ = self.append_event(id, serde_json::to_value(payload)?);
        }

        result.counts.insert("requested".to_string(), normalized.len());
        result.counts.insert("updated".to_string(), result.updated.len());
        result.counts.insert("failed".to_string(), result.failed.len());
        Ok(result)
    }

    fn validate_plan_review(tasks: &[Task], id: &str) -> Result<(), BatchTaskFailure> {
        let Some(task) = tasks.iter().find(|t| t.id == id) else {
            return Err(BatchTaskFailure {
                task_id: id.to_string(),
                error_code: "TASK_NOT_FOUND".to_string(),
                error_message: format!("task {id} not found"),
            });
        };
        if task.status != TaskStatus::PlanReview {
            return Err(BatchTaskFailure {
                task_id: id.to_string(),
                error_code: "INVALID_STATUS".to_string(),
                error_message: format!("task {id} is not in PLAN_REVIEW"),
            });
        }
        if task.plan_result.is_none() {
            return Err(BatchTaskFailure {
                task_id: id.to_string(),
                error_code: "PLAN_RESULT_MISSING".to_string(),
                error_message: format!("task {id} has no plan_result"),
            });
        }
        Ok(())
    }

    // ----------------------------------------------------------------- runs

    pub fn create_run(&self, task_id: &str, worker_id: &str) -> StoreResult<TaskRun> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "runs")?;
        let mut runs: Vec<TaskRun> = collection::load(&self.paths.runs_file());
        let existing_ids: HashSet<String> = runs.iter().map(|r| r.id.clone()).collect();
        let id = id::next_id(&existing_ids)?;
        let attempt = runs.iter().filter(|r| r.task_id == task_id).count() as i64 + 1;
        let run = TaskRun::new(id, task_id.to_string(), worker_id.to_string(), attempt, utcnow_iso());
        runs.push(run.clone());
        collection::save(&self.paths.runs_file(), &runs)?;
        Ok(run)
    }

    pub fn update_run(&self, id: &str, patch: RunPatch) -> StoreResult<TaskRun> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "runs")?;
        let mut runs: Vec<TaskRun> = collection::load(&self.paths.runs_file());
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RunNotFound(id.to_string()))?;
        run.apply_patch(patch);
        let updated = run.clone();
        collection::save(&self.paths.runs_file(), &runs)?;
        Ok(updated)
    }

    pub fn list_runs(&self, task_id: Option<&str>) -> StoreResult<Vec<TaskRun>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "runs")?;
        let mut runs: Vec<TaskRun> = collection::load(&self.paths.runs_file());
        if let Some(task_id) = task_id {
            runs.retain(|r| r.task_id == task_id);
        }
        Ok(runs)
    }

    pub fn get_run(&self, id: &str) -> StoreResult<Option<TaskRun>> {
        Ok(self.list_runs(None)?.into_iter().find(|r| r.id == id))
    }

    // ---------------------------------------------------------------- events

    /// Append one event line, stamping `seq` (1-based, gapless) and `ts`.
    /// `payload` must serialize to a JSON object; its own `type` field (and
    /// any other fields) pass through untouched.
    pub fn append_event(&self, task_id: &str, payload: Value) -> StoreResult<i64> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), &format!("log-{task_id}"))?;
        let path = self.paths.task_log_file(task_id);
        paths::ensure_parent(&path)?;

        let existing = Self::read_log_lines(&path);
        let max_seq = existing.iter().filter_map(|v| v.get("seq").and_then(Value::as_i64)).max().unwrap_or(0);
        let seq = max_seq + 1;

        let mut obj = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        obj.insert("seq".to_string(), Value::from(seq));
        obj.insert("ts".to_string(), Value::String(utcnow_iso()));

        let line = serde_json::to_string(&Value::Object(obj))?;
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        Ok(seq)
    }

    pub fn read_events(&self, task_id: &str, cursor: i64) -> StoreResult<EventBatch> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), &format!("log-{task_id}"))?;
        let path = self.paths.task_log_file(task_id);
        let lines = Self::read_log_lines(&path);
        let max_seq = lines.iter().filter_map(|v| v.get("seq").and_then(Value::as_i64)).max().unwrap_or(cursor);
        let next_cursor = max_seq.max(cursor);
        let events: Vec<Value> = lines
            .into_iter()
            .filter(|v| v.get("seq").and_then(Value::as_i64).unwrap_or(0) > cursor)
            .collect();
        Ok(EventBatch { next_cursor, events })
    }

    fn read_log_lines(path: &Path) -> Vec<Value> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    // --------------------------------------------------------- notifications

    pub fn create_notification(
        &self,
        task_id: &str,
        kind: NotificationType,
        title: &str,
        body: &str,
    ) -> StoreResult<Notification> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "notifications")?;
        let mut notifications: Vec<Notification> = collection::load(&self.paths.notifications_file());
        let existing_ids: HashSet<String> = notifications.iter().map(|n| n.id.clone()).collect();
        let id = id::next_id(&existing_ids)?;
        let notification = Notification::new(id, task_id.to_string(), kind, title.to_string(), body.to_string(), utcnow_iso());
        notifications.push(notification.clone());
        collection::save(&self.paths.notifications_file(), &notifications)?;
        Ok(notification)
    }

    pub fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "notifications")?;
        let mut notifications: Vec<Notification> = collection::load(&self.paths.notifications_file());
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, id: &str) -> StoreResult<Notification> {
        let _lock = FileLock::acquire(&self.paths.locks_dir(), "notifications")?;
        let mut notifications: Vec<Notification> = collection::load(&self.paths.notifications_file());
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NotificationNotFound(id.to_string()))?;
        notification.read = true;
        let updated = notification.clone();
        collection::save(&self.paths.notifications_file(), &notifications)?;
        Ok(updated)
    }

    // ---------------------------------------------------------------- board

    pub fn board(&self, repo_id: Option<&str>) -> StoreResult<BoardResponse> {
        let tasks = self.list_tasks(repo_id, None, None)?;
        let mut columns: std::collections::HashMap<String, Vec<Task>> = std::collections::HashMap::new();
        for name in ["TODO", "RUNNING", "REVIEW", "DONE", "FAILED", "CANCELLED"] {
            columns.insert(name.to_string(), Vec::new());
        }
        for task in tasks {
            let column = match task.status {
                TaskStatus::Todo | TaskStatus::Ready => "TODO",
                TaskStatus::Running | TaskStatus::PlanRunning => "RUNNING",
                TaskStatus::Review | TaskStatus::PlanReview => "REVIEW",
                TaskStatus::Done => "DONE",
                TaskStatus::Failed => "FAILED",
                TaskStatus::Cancelled => "CANCELLED",
            };
            columns.get_mut(column).expect("column initialized above").push(task);
        }
        let counts = columns.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        Ok(BoardResponse { columns, counts })
    }

    // --------------------------------------------------------------- janitor

    /// Delete per-task NDJSON logs older than `retention_days` by mtime.
    /// A non-positive retention is a no-op.
    pub fn cleanup_old_logs(&self, retention_days: i64) -> StoreResult<usize> {
        if retention_days <= 0 {
            return Ok(0);
        }
        let logs_dir = self.paths.logs_dir();
        let Ok(entries) = std::fs::read_dir(&logs_dir) else {
            return Ok(0);
        };

        let cutoff = std::time::SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(retention_days as u64 * 86_400));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let mut deleted = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ndjson") {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            if modified < cutoff && std::fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::TaskCreateInput;

    fn store() -> (Store, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        (Store::new(dir.path()), dir)
    }

    fn task_input(repo_id: &str) -> TaskCreateInput {
        TaskCreateInput {
            repo_id: repo_id.to_string(),
            title: "do the thing".to_string(),
            prompt: "please do the thing".to_string(),
            mode: TaskMode::Exec,
            permission_mode: Default::default(),
            priority: 0,
        }
    }

    #[test]
    fn create_and_get_task_round_trips() {
        let (store, _dir) = store();
        let created = store.create_task(task_input("repo-a")).unwrap();
        let fetched = store.get_task(&created.id).unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, TaskStatus::Todo);
    }

    #[test]
    fn claim_next_task_prefers_priority_then_age() {
        let (store, _dir) = store();
        let mut low = task_input("repo-a");
        low.priority = 0;
        let mut high = task_input("repo-a");
        high.priority = 5;
        let first = store.create_task(low).unwrap();
        let second = store.create_task(high).unwrap();

        let claimed = store.claim_next_task("worker-1").unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.worker_id, "worker-1");

        let claimed_again = store.claim_next_task("worker-1").unwrap().unwrap();
        assert_eq!(claimed_again.id, first.id);
    }

    #[test]
    fn claim_next_task_skips_cancel_requested() {
        let (store, _dir) = store();
        let task = store.create_task(task_input("repo-a")).unwrap();
        store.cancel_task(&task.id).unwrap();
        assert!(store.claim_next_task("worker-1").unwrap().is_none());
    }

    #[test]
    fn cancel_running_task_is_sticky_not_terminal() {
        let (store, _dir) = store();
        let task = store.create_task(task_input("repo-a")).unwrap();
        store.claim_next_task("worker-1").unwrap();
        let cancelled = store.cancel_task(&task.id).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Running);
        assert!(cancelled.cancel_requested);
    }

    #[test]
    fn append_and_read_events_advances_cursor() {
        let (store, _dir) = store();
        let task = store.create_task(task_input("repo-a")).unwrap();
        store.append_event(&task.id, serde_json::json!({"type": "command", "line": "echo hi"})).unwrap();
        store.append_event(&task.id, serde_json::json!({"type": "stream", "line": "hi"})).unwrap();

        let batch = store.read_events(&task.id, 0).unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.next_cursor, 2);

        let from_cursor = store.read_events(&task.id, 1).unwrap();
        assert_eq!(from_cursor.events.len(), 1);
        assert_eq!(from_cursor.next_cursor, 2);
    }

    #[test]
    fn create_run_increments_attempt_per_task() {
        let (store, _dir) = store();
        let task = store.create_task(task_input("repo-a")).unwrap();
        let run1 = store.create_run(&task.id, "worker-1").unwrap();
        let run2 = store.create_run(&task.id, "worker-1").unwrap();
        assert_eq!(run1.attempt, 1);
        assert_eq!(run2.attempt, 2);
    }

    #[test]
    fn board_groups_tasks_by_column() {
        let (store, _dir) = store();
        store.create_task(task_input("repo-a")).unwrap();
        let board = store.board(None).unwrap();
        assert_eq!(board.counts["TODO"], 1);
        assert_eq!(board.counts["DONE"], 0);
    }

    #[test]
    fn batch_confirm_plan_tasks_requires_plan_review() {
        let (store, _dir) = store();
        let task = store.create_task(task_input("repo-a")).unwrap();
        let result = store.batch_confirm_plan_tasks(&[task.id.clone()]).unwrap();
        assert_eq!(result.updated.len(), 0);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].error_code, "INVALID_STATUS");
    }

    #[test]
    fn batch_confirm_plan_tasks_promotes_to_exec_ready() {
        let (store, _dir) = store();
        let task = store.create_task(task_input("repo-a")).unwrap();
        store
            .update_task(
                &task.id,
                TaskPatch {
                    status: Some(TaskStatus::PlanReview),
                    plan_result: Some(Some(crate::models::PlanResult {
                        summary: "plan summary".to_string(),
                        ..Default::default()
                    })),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = store.batch_confirm_plan_tasks(&[task.id.clone()]).unwrap();
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].status, TaskStatus::Ready);
        assert_eq!(result.updated[0].mode, TaskMode::Exec);
        assert!(result.updated[0].prompt.contains("plan summary"));
    }

    #[test]
    fn normalize_task_ids_dedupes_and_trims() {
        let ids = vec![" a ".to_string(), "a".to_string(), "".to_string(), "b".to_string()];
        assert_eq!(Store::normalize_task_ids(&ids), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn cleanup_old_logs_is_noop_for_nonpositive_retention() {
        let (store, _dir) = store();
        assert_eq!(store.cleanup_old_logs(0).unwrap(), 0);
        assert_eq!(store.cleanup_old_logs(-1).unwrap(), 0);
    }
}
