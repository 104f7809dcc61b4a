use std::sync::Arc;

use repopilot_local_deployment::LocalDeployment;
use repopilot_utils::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::load();
    repopilot_utils::logging::init(&settings.backend_log_path())?;

    let deployment: Arc<dyn repopilot_server::Deployment> = Arc::new(LocalDeployment::start(&settings));
    let app = repopilot_server::app(deployment);

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "repopilot server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
