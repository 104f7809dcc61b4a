use serde::Serialize;
use serde_json::Value;
use ts_rs::TS;

/// Known event shapes a producer can build with `serde_json::to_value` before
/// handing it to `Store::append_event`. The store itself stays untyped (see
/// `EventBatch` below): this enum exists so producers in other crates don't
/// hand-roll `json!` objects and typo a field name. Events this enum doesn't
/// name yet are still accepted by the store as plain objects.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    #[serde(rename = "command")]
    Command { line: String },
    #[serde(rename = "stream")]
    Stream { line: String },
    #[serde(rename = "assistant_text")]
    AssistantText { text: String },
    #[serde(rename = "timeout")]
    Timeout { seconds: u64 },
    #[serde(rename = "artifact")]
    Artifact { path: String },
    #[serde(rename = "session_created")]
    SessionCreated { session_id: String },
    #[serde(rename = "session_resumed")]
    SessionResumed { session_id: String },
    #[serde(rename = "session_resume_failed")]
    SessionResumeFailed { session_id: String, excerpt: String },
    #[serde(rename = "session_fallback_created")]
    SessionFallbackCreated { old_session_id: String, new_session_id: String },
    #[serde(rename = "worktree_cleanup")]
    WorktreeCleanup {
        trigger_status: String,
        result: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "pr_fallback")]
    PrFallback { compare_url: String, reason: String },
    #[serde(rename = "strategy_generated")]
    StrategyGenerated { template: String },
    #[serde(rename = "plan_batch_confirm")]
    PlanBatchConfirm {},
    #[serde(rename = "plan_batch_revise")]
    PlanBatchRevise { feedback: String },
}

/// A batch of task log events read from a given cursor, plus the cursor to
/// resume from on the next poll. Events are free-form JSON objects (a `type`
/// string plus type-specific fields) rather than a closed enum: the agent
/// subprocess, the scheduler and the git pipeline each append their own shape,
/// and locking the wire format down would make every new diagnostic event a
/// breaking change.
#[derive(Debug, Clone, serde::Serialize, TS)]
#[ts(export)]
pub struct EventBatch {
    pub next_cursor: i64,
    #[ts(type = "Record<string, unknown>[]")]
    pub events: Vec<Value>,
}
