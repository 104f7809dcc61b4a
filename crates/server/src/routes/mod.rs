pub mod board;
pub mod health;
pub mod logs;
pub mod notifications;
pub mod repos;
pub mod settings;
pub mod tasks;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::AppState;

/// Merge every sub-router and bind the shared `AppState`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(board::router())
        .merge(health::router())
        .merge(repos::router())
        .merge(tasks::router())
        .merge(notifications::router())
        .merge(settings::router())
        .merge(logs::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
}
