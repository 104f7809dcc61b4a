use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use repopilot_db::models::{
    EventBatch, PlanBatchActionResult, PlanBatchConfirmInput, PlanBatchReviseInput,
    PlanConfirmInput, PlanReviseInput, Task, TaskCreateInput, TaskMode, TaskPatch,
    TaskRetryInput, TaskStatus,
};
use repopilot_db::{Store, StoreError};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/plan/batch/confirm", post(batch_confirm_plan))
        .route("/api/tasks/plan/batch/revise", post(batch_revise_plan))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/events", get(get_events))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/tasks/{id}/retry", post(retry_task))
        .route("/api/tasks/{id}/done", post(done_task))
        .route("/api/tasks/{id}/plan/confirm", post(confirm_plan))
        .route("/api/tasks/{id}/plan/revise", post(revise_plan))
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    repo_id: Option<String>,
    status: Option<String>,
    keyword: Option<String>,
}

async fn list_tasks(State(state): State<AppState>, Query(q): Query<ListTasksQuery>) -> ApiResult<Json<Vec<Task>>> {
    let status = q
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("invalid status: {e}")))?;
    Ok(Json(state.store().list_tasks(q.repo_id.as_deref(), status, q.keyword.as_deref())?))
}

async fn create_task(State(state): State<AppState>, Json(input): Json<TaskCreateInput>) -> ApiResult<Json<Task>> {
    let repo = state
        .store()
        .get_repo(&input.repo_id)?
        .ok_or_else(|| ApiError::BadRequest(format!("repo not found: {}", input.repo_id)))?;
    if !repo.enabled {
        return Err(ApiError::BadRequest(format!("repo disabled: {}", repo.id)));
    }
    Ok(Json(state.store().create_task(input)?))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Task>> {
    let task = state.store().get_task(&id)?.ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default)]
    cursor: i64,
}

async fn get_events(State(state): State<AppState>, Path(id): Path<String>, Query(q): Query<EventsQuery>) -> ApiResult<Json<EventBatch>> {
    state.store().get_task(&id)?.ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
    Ok(Json(state.store().read_events(&id, q.cursor)?))
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Task>> {
    let task = state.store().cancel_task(&id)?;
    state.request_cancel(&id);
    Ok(Json(task))
}

async fn retry_task(State(state): State<AppState>, Path(id): Path<String>, Json(input): Json<TaskRetryInput>) -> ApiResult<Json<Task>> {
    Ok(Json(state.store().reset_task_for_retry(&id, input.reset_mode)?))
}

async fn done_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Task>> {
    let task = state.store().get_task(&id)?.ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
    if task.status != TaskStatus::Review {
        return Err(ApiError::BadRequest(format!("task status must be REVIEW, got {}", task.status)));
    }
    state
        .cleanup_task_worktree_on_done(&task)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(state.store().update_task(&id, TaskPatch { status: Some(TaskStatus::Done), ..Default::default() })?))
}

async fn confirm_plan(State(state): State<AppState>, Path(id): Path<String>, Json(input): Json<PlanConfirmInput>) -> ApiResult<Json<Task>> {
    let task = state.store().get_task(&id)?.ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
    if task.status != TaskStatus::PlanReview {
        return Err(ApiError::BadRequest(format!("task status must be PLAN_REVIEW, got {}", task.status)));
    }
    let plan = task.plan_result.clone().ok_or_else(|| ApiError::BadRequest(format!("task {id} has no plan_result")))?;
    let final_prompt = repopilot_db::plan::build_exec_prompt(&task.prompt, &plan, &input.answers);
    let updated = state.store().update_task(
        &id,
        TaskPatch {
            mode: Some(TaskMode::Exec),
            status: Some(TaskStatus::Ready),
            prompt: Some(final_prompt),
            plan_answers: Some(input.answers),
            ..TaskPatch::clear_error()
        },
    )?;
    Ok(Json(updated))
}

async fn revise_plan(State(state): State<AppState>, Path(id): Path<String>, Json(input): Json<PlanReviseInput>) -> ApiResult<Json<Task>> {
    let task = state.store().get_task(&id)?.ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
    if task.status != TaskStatus::PlanReview {
        return Err(ApiError::BadRequest(format!("task status must be PLAN_REVIEW, got {}", task.status)));
    }
    let revised_prompt = format!("{}\n\n[用户反馈]\n{}", task.prompt, input.feedback.trim());
    let updated = state.store().update_task(
        &id,
        TaskPatch {
            mode: Some(TaskMode::Plan),
            status: Some(TaskStatus::Todo),
            prompt: Some(revised_prompt),
            ..TaskPatch::clear_error()
        },
    )?;
    Ok(Json(updated))
}

async fn batch_confirm_plan(State(state): State<AppState>, Json(input): Json<PlanBatchConfirmInput>) -> ApiResult<Json<PlanBatchActionResult>> {
    let ids = validated_batch_ids(&input.task_ids)?;
    Ok(Json(state.store().batch_confirm_plan_tasks(&ids)?))
}

async fn batch_revise_plan(State(state): State<AppState>, Json(input): Json<PlanBatchReviseInput>) -> ApiResult<Json<PlanBatchActionResult>> {
    let ids = validated_batch_ids(&input.task_ids)?;
    let feedback = input.feedback.trim();
    if feedback.is_empty() {
        return Err(ApiError::BadRequest("feedback must not be empty".to_string()));
    }
    Ok(Json(state.store().batch_revise_plan_tasks(&ids, feedback)?))
}

fn validated_batch_ids(raw: &[String]) -> ApiResult<Vec<String>> {
    let ids = Store::normalize_task_ids(raw);
    if ids.is_empty() || ids.len() > 100 {
        return Err(ApiError::BadRequest("task_ids count after dedupe must be between 1 and 100".to_string()));
    }
    Ok(ids)
}
