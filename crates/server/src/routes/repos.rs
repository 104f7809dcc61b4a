use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use repopilot_db::models::{RepoConfig, RepoPatchInput};

use crate::AppState;
use crate::error::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/repos", get(list_repos))
        .route("/api/repos/rescan", post(rescan_repos))
        .route("/api/repos/{id}", patch(patch_repo))
}

async fn list_repos(State(state): State<AppState>) -> ApiResult<Json<Vec<RepoConfig>>> {
    Ok(Json(state.store().list_repos()?))
}

async fn rescan_repos(State(state): State<AppState>) -> ApiResult<Json<Vec<RepoConfig>>> {
    let state_dir = &state.store().paths().state_dir;
    let root_dir = state_dir.parent().unwrap_or(state_dir);
    let repos_dir = root_dir.join("repos");
    Ok(Json(state.store().rescan_repos(&repos_dir)?))
}

async fn patch_repo(State(state): State<AppState>, Path(id): Path<String>, Json(patch): Json<RepoPatchInput>) -> ApiResult<Json<RepoConfig>> {
    Ok(Json(state.store().patch_repo(&id, patch)?))
}
