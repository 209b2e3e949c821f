//! Main entry point for the Text Generation Gateway

use std::sync::Arc;
use textgen_gateway::{api, config::Settings, AppState};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    if settings.logging.format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    }

    info!("Starting Text Generation Gateway");
    info!(
        "Loaded configuration: server={}:{} active_backend={}",
        settings.server.host, settings.server.port, settings.gateway.active_backend
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app_state = Arc::new(AppState::from_settings(settings));

    // Warm the active backend so configuration problems show up at startup
    if let Err(e) = app_state.registry.resolve_active() {
        warn!(error = %e, "Active backend is not usable yet");
    }

    // Build the router
    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
