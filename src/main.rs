use std::sync::Arc;

use anyhow::Context;
use gemini_chat_gateway::{
    config::Config, routes, services::gemini::GeminiClient, state::AppState,
};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let client = GeminiClient::new(config.api_key.clone(), config.base_url.clone());
    let state = Arc::new(AppState::new(Arc::new(client), config.sessions.clone()));
    let purge = state.sessions.spawn_purge_task(config.purge_interval);

    let mut app = routes::create_router().with_state(state);
    if config.cors_permissive {
        app = app.layer(CorsLayer::very_permissive());
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        addr = %config.bind_addr,
        model = %config.sessions.model,
        "chat gateway listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    purge.abort();
    Ok(())
}
