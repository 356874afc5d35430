use anyhow::Result;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use draftcheck_core::openai::OpenAIClient;
use draftcheck_server::config::Config;
use draftcheck_server::github::GitHubClient;
use draftcheck_server::lifecycle::CheckLifecycle;
use draftcheck_server::rate_limit::RateLimiter;
use draftcheck_server::store::{KvStore, SqliteKvStore};
use draftcheck_server::webhook::webhook_router;
use draftcheck_server::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "draftcheck"
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting draftcheck article review bot");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let github_client = GitHubClient::new(config.github_app_id, config.github_private_key);
    let openai_client = OpenAIClient::new(config.openai_api_key);

    let db_path = config.state_dir.join("draftcheck-state.db");
    info!("Using state database: {}", db_path.display());
    let store: Arc<dyn KvStore> =
        Arc::new(SqliteKvStore::new(&db_path).expect("Failed to initialize SQLite database"));

    let lifecycle = Arc::new(CheckLifecycle::new(store.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(store));

    // Reclaim records left behind by a crash before accepting any requests
    if let Err(e) = lifecycle.sweep().await {
        warn!("Startup sweep failed: {}", e);
    }

    let app_state = Arc::new(AppState {
        github_client: Arc::new(github_client),
        openai_client: Arc::new(openai_client),
        lifecycle,
        rate_limiter,
        webhook_secret: config.github_webhook_secret,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
