use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/logs/backend", get(get_backend_logs))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_lines")]
    lines: usize,
}

fn default_lines() -> usize {
    200
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    path: String,
    lines: usize,
    content: Vec<String>,
}

async fn get_backend_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Json<LogsResponse> {
    let lines = q.lines.clamp(1, 2000);
    let path = state.store().paths().state_dir.join("logs").join("backend.log");
    let content = repopilot_utils::tail_file(&path, lines);
    Json(LogsResponse { path: path.to_string_lossy().into_owned(), lines: content.len(), content })
}
