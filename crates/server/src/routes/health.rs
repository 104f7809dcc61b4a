use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use repopilot_db::models::HealthResponse;
use repopilot_utils::env_probe;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(get_health))
}

async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let state_dir = &state.store().paths().state_dir;
    let root_dir = state_dir.parent().unwrap_or(state_dir);
    let report = env_probe::get_health(root_dir);
    Json(HealthResponse {
        status: report.status,
        python_env_selected: report.python_env_selected,
        dependencies: report.dependencies,
        paths: report.paths,
    })
}
