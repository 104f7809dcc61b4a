use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use repopilot_utils::ExecMode;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/settings/exec-mode", get(get_exec_mode).put(put_exec_mode))
}

#[derive(Debug, Serialize, Deserialize)]
struct ExecModeBody {
    exec_mode: ExecMode,
}

async fn get_exec_mode(State(state): State<AppState>) -> Json<ExecModeBody> {
    Json(ExecModeBody { exec_mode: state.exec_mode() })
}

async fn put_exec_mode(State(state): State<AppState>, Json(body): Json<ExecModeBody>) -> Json<ExecModeBody> {
    state.set_exec_mode(body.exec_mode);
    Json(ExecModeBody { exec_mode: state.exec_mode() })
}
