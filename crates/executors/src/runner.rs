use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use command_group::AsyncCommandGroup;
use repopilot_db::models::{PermissionMode, Task, TaskPatch};
use repopilot_db::Store;
use regex::{Regex, RegexBuilder};
use serde_json::json;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::ExecutorResult;
use crate::merged_stdio;
use crate::process_registry::ProcessRegistry;

/// Default wall-clock budget for a single agent invocation, covering both
/// PLAN and EXEC runs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2700);

/// How long to wait for the process to exit on its own after it has been
/// asked to terminate, before escalating to a hard kill.
const GRACEFUL_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub exit_code: i32,
    pub text: String,
    pub cancelled: bool,
}

/// Drives one `claude` subprocess invocation per call: builds the command
/// line from the task's session/permission state, streams combined
/// stdout+stderr into the task's event log, and resolves session-resume
/// failures by minting a fresh session and retrying once.
pub struct AgentRunner {
    registry: Arc<ProcessRegistry>,
}

impl Default for AgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRunner {
    pub fn new() -> Self {
        Self { registry: Arc::new(ProcessRegistry::new()) }
    }

    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    /// Request cancellation of whatever is currently running for `task_id`.
    /// Safe to call from any thread; a no-op if nothing is running.
    pub fn cancel(&self, task_id: &str) {
        self.registry.terminate(task_id);
    }

    /// Stream one logical agent turn, transparently handling the
    /// resume-then-fallback session dance.
    pub async fn stream_claude(
        &self,
        store: &Store,
        task: &Task,
        prompt: &str,
        workdir: &std::path::Path,
        timeout: Duration,
        conda_env: Option<&str>,
    ) -> ExecutorResult<AgentOutcome> {
        let (session_id, created) = self.ensure_task_session_id(store, task)?;
        if created {
            store.append_event(
                &task.id,
                json!({"type": "session_created", "session_id": session_id, "message": format!("Created Claude session {session_id}")}),
            )?;
        } else {
            store.append_event(
                &task.id,
                json!({"type": "session_resumed", "session_id": session_id, "message": format!("Resuming Claude session {session_id}")}),
            )?;
        }

        let use_resume = !created;
        let cmd = build_claude_cmd(task, prompt, &session_id, use_resume, conda_env);
        let outcome = self.run_claude_cmd(store, &task.id, &cmd, workdir, timeout).await?;

        let should_fallback =
            use_resume && !outcome.cancelled && outcome.exit_code != 0 && is_resume_recoverable_error(&outcome.text);
        if !should_fallback {
            return Ok(outcome);
        }

        let excerpt: String = outcome.text.chars().take(1000).collect();
        store.append_event(
            &task.id,
            json!({
                "type": "session_resume_failed",
                "session_id": session_id,
                "excerpt": excerpt,
            }),
        )?;

        let new_session_id = Uuid::new_v4().to_string();
        let patched = store.update_task(
            &task.id,
            TaskPatch { claude_session_id: Some(Some(new_session_id.clone())), ..Default::default() },
        )?;
        let new_session_id = patched.claude_session_id.unwrap_or(new_session_id);

        store.append_event(
            &task.id,
            json!({
                "type": "session_fallback_created",
                "old_session_id": session_id,
                "new_session_id": new_session_id,
            }),
        )?;

        let fallback_cmd = build_claude_cmd(task, prompt, &new_session_id, false, conda_env);
        self.run_claude_cmd(store, &task.id, &fallback_cmd, workdir, timeout).await
    }

    fn ensure_task_session_id(&self, store: &Store, task: &Task) -> ExecutorResult<(String, bool)> {
        if let Some(session_id) = &task.claude_session_id {
            return Ok((session_id.clone(), false));
        }
        if let Some(latest) = store.get_task(&task.id)? {
            if let Some(session_id) = latest.claude_session_id {
                return Ok((session_id, false));
            }
        }

        let new_session_id = Uuid::new_v4().to_string();
        let patched = store.update_task(
            &task.id,
            TaskPatch { claude_session_id: Some(Some(new_session_id.clone())), ..Default::default() },
        )?;
        Ok((patched.claude_session_id.unwrap_or(new_session_id), true))
    }

    fn is_cancel_requested(&self, store: &Store, task_id: &str) -> ExecutorResult<bool> {
        Ok(store.get_task(task_id)?.map(|t| t.cancel_requested).unwrap_or(false))
    }

    async fn run_claude_cmd(
        &self,
        store: &Store,
        task_id: &str,
        cmd: &[String],
        workdir: &std::path::Path,
        timeout: Duration,
    ) -> ExecutorResult<AgentOutcome> {
        store.append_event(task_id, json!({"type": "command", "line": cmd.join(" ")}))?;

        // Stdout and stderr must land in the log in the order the child
        // actually wrote them: point both at the same OS pipe instead of two
        // independently-piped streams, which would race two reader tasks
        // against each other and can reorder interleaved output.
        let (reader, stdout_stdio, stderr_stdio) = merged_stdio::make()?;

        let mut command = Command::new(&cmd[0]);
        command
            .args(&cmd[1..])
            .current_dir(workdir)
            .stdout(stdout_stdio)
            .stderr(stderr_stdio)
            .kill_on_drop(true);

        let mut child = command.group_spawn()?;
        if let Some(pid) = child.id() {
            self.registry.register(task_id, pid);
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        merged_stdio::spawn_line_reader(reader, tx);

        let mut collected_text = Vec::new();
        let mut cancelled = false;
        let start = Instant::now();

        while let Some(raw_line) = rx.recv().await {
            let stripped = strip_ansi_escapes::strip_str(&raw_line);
            let line = stripped.trim_end();
            if line.is_empty() {
                continue;
            }

            store.append_event(task_id, json!({"type": "stream", "line": line}))?;
            let text = extract_text_from_stream_line(line);
            if !text.is_empty() {
                collected_text.push(text);
            }

            if self.is_cancel_requested(store, task_id)? {
                cancelled = true;
                self.registry.terminate(task_id);
                break;
            }

            if start.elapsed() > timeout {
                store.append_event(task_id, json!({"type": "timeout", "seconds": timeout.as_secs()}))?;
                self.registry.terminate(task_id);
                break;
            }
        }

        let exit_status = match tokio::time::timeout(GRACEFUL_WAIT, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                child.wait().await?
            }
        };

        self.registry.unregister(task_id);

        if !cancelled && self.is_cancel_requested(store, task_id)? {
            cancelled = true;
        }

        Ok(AgentOutcome {
            exit_code: exit_status.code().unwrap_or(0),
            text: collected_text.join("\n").trim().to_string(),
            cancelled,
        })
    }
}

/// `claude -p <prompt> --output-format stream-json --verbose
/// (--resume <sid> | --session-id <sid>) --permission-mode (bypassPermissions|default)`,
/// prefixed with `conda run -n <env>` when a conda environment was selected.
pub fn build_claude_cmd(task: &Task, prompt: &str, session_id: &str, use_resume: bool, conda_env: Option<&str>) -> Vec<String> {
    let mut cmd = vec![
        "claude".to_string(),
        "-p".to_string(),
        prompt.to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];
    if use_resume {
        cmd.push("--resume".to_string());
    } else {
        cmd.push("--session-id".to_string());
    }
    cmd.push(session_id.to_string());

    cmd.push("--permission-mode".to_string());
    cmd.push(
        match task.permission_mode {
            PermissionMode::Bypass => "bypassPermissions",
            PermissionMode::Default => "default",
        }
        .to_string(),
    );

    match conda_env {
        Some(env) => {
            let mut prefixed = vec!["conda".to_string(), "run".to_string(), "-n".to_string(), env.to_string()];
            prefixed.extend(cmd);
            prefixed
        }
        None => cmd,
    }
}

/// Pull embedded assistant text out of one `stream-json` line: fields `text`,
/// `result`, `message.content[].text`, `delta.text`. A line that isn't valid
/// JSON is returned verbatim (it's still useful context even if we can't
/// pick it apart).
pub fn extract_text_from_stream_line(line: &str) -> String {
    let Ok(payload) = serde_json::from_str::<serde_json::Value>(line) else {
        return line.to_string();
    };

    let mut chunks = Vec::new();
    if let Some(text) = payload.get("text").and_then(serde_json::Value::as_str) {
        chunks.push(text.to_string());
    }
    if let Some(result) = payload.get("result").and_then(serde_json::Value::as_str) {
        chunks.push(result.to_string());
    }
    if let Some(items) = payload.get("message").and_then(|m| m.get("content")).and_then(serde_json::Value::as_array) {
        for item in items {
            if let Some(text) = item.get("text").and_then(serde_json::Value::as_str) {
                chunks.push(text.to_string());
            }
        }
    }
    if let Some(text) = payload.get("delta").and_then(|d| d.get("text")).and_then(serde_json::Value::as_str) {
        chunks.push(text.to_string());
    }

    chunks.join("\n").trim().to_string()
}

fn resume_fallback_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"session id .*not found",
            r"failed to resume",
            r"unable to resume",
            r"cannot resume",
            r"invalid session",
            r"session .*does not exist",
        ]
        .into_iter()
        .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build().expect("static pattern is valid"))
        .collect()
    })
}

pub fn is_resume_recoverable_error(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    resume_fallback_patterns().iter().any(|pattern| pattern.is_match(text))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use repopilot_db::models::{PlanResult, TaskMode, TaskStatus};

    use super::*;

    fn task(permission_mode: PermissionMode, session_id: Option<&str>) -> Task {
        Task {
            id: "250101-001".to_string(),
            repo_id: "repo-a".to_string(),
            title: "demo".to_string(),
            prompt: "do it".to_string(),
            mode: TaskMode::Exec,
            status: TaskStatus::Running,
            permission_mode,
            priority: 0,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
            current_run_id: None,
            claude_session_id: session_id.map(str::to_string),
            plan_result: None::<PlanResult>,
            plan_answers: HashMap::new(),
            exec_strategy: None,
            pr_url: String::new(),
            error_code: String::new(),
            error_message: String::new(),
            cancel_requested: false,
            worker_id: String::new(),
        }
    }

    #[test]
    fn build_claude_cmd_uses_resume_when_requested() {
        let t = task(PermissionMode::Bypass, Some("sid-1"));
        let cmd = build_claude_cmd(&t, "hello", "sid-1", true, None);
        assert!(cmd.contains(&"--resume".to_string()));
        assert!(!cmd.contains(&"--session-id".to_string()));
        assert!(cmd.contains(&"bypassPermissions".to_string()));
    }

    #[test]
    fn build_claude_cmd_uses_session_id_for_new_sessions() {
        let t = task(PermissionMode::Default, None);
        let cmd = build_claude_cmd(&t, "hello", "sid-2", false, None);
        assert!(cmd.contains(&"--session-id".to_string()));
        assert!(cmd.contains(&"default".to_string()));
    }

    #[test]
    fn build_claude_cmd_prefixes_conda_run_when_env_selected() {
        let t = task(PermissionMode::Bypass, Some("sid-1"));
        let cmd = build_claude_cmd(&t, "hello", "sid-1", true, Some("forge-py311"));
        assert_eq!(&cmd[0..4], &["conda", "run", "-n", "forge-py311"]);
        assert_eq!(cmd[4], "claude");
    }

    #[test]
    fn extract_text_from_stream_line_prefers_structured_fields() {
        let line = r#"{"text": "hello", "delta": {"text": "world"}}"#;
        assert_eq!(extract_text_from_stream_line(line), "hello\nworld");
    }

    #[test]
    fn extract_text_from_stream_line_reads_message_content() {
        let line = r#"{"message": {"content": [{"text": "a"}, {"text": "b"}]}}"#;
        assert_eq!(extract_text_from_stream_line(line), "a\nb");
    }

    #[test]
    fn extract_text_from_stream_line_passes_through_non_json() {
        assert_eq!(extract_text_from_stream_line("plain log line"), "plain log line");
    }

    #[test]
    fn is_resume_recoverable_error_matches_known_patterns() {
        assert!(is_resume_recoverable_error("Error: session id abc123 not found"));
        assert!(is_resume_recoverable_error("FAILED TO RESUME session"));
        assert!(!is_resume_recoverable_error("permission denied"));
        assert!(!is_resume_recoverable_error(""));
    }
}
