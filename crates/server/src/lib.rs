pub mod error;
pub mod routes;

use std::sync::Arc;

pub use repopilot_deployment::Deployment;

/// The trait object every handler is written against: swapping the local
/// JSON-file deployment for a future hosted one is a matter of constructing
/// a different `Arc<dyn Deployment>`, not touching a single route.
pub type AppState = Arc<dyn Deployment>;

pub fn app(state: AppState) -> axum::Router {
    routes::router(state)
}
