use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use repopilot_db::models::BoardResponse;

use crate::AppState;
use crate::error::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/board", get(get_board))
}

#[derive(Debug, Deserialize)]
struct BoardQuery {
    repo_id: Option<String>,
}

async fn get_board(State(state): State<AppState>, Query(q): Query<BoardQuery>) -> ApiResult<Json<BoardResponse>> {
    Ok(Json(state.store().board(q.repo_id.as_deref())?))
}
