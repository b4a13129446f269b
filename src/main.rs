//! Main entry point for the AI photo editor backend

use ai_photo_editor::{api, config::Settings, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config_path =
        std::env::var("PHOTO_EDITOR_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let settings = Settings::load_from_path(&config_path)?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }

    settings.validate()?;

    info!(
        config = %config_path,
        host = %settings.server.host,
        port = settings.server.port,
        backend = ?settings.generation.backend.kind,
        default_model = %settings.generation.default_model,
        "Starting AI photo editor backend"
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = Arc::new(AppState::from_settings(settings)?);
    state.uploads.ensure_dir().await?;

    let app = api::create_router(state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
