use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use repopilot_db::models::Notification;

use crate::AppState;
use crate::error::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/read", post(mark_read))
}

async fn list_notifications(State(state): State<AppState>) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.store().list_notifications()?))
}

async fn mark_read(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Notification>> {
    Ok(Json(state.store().mark_notification_read(&id)?))
}
