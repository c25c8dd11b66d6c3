use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use repo_insight::api;
use repo_insight::config::Config;
use repo_insight::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "LLM provider: {} ({}, model {})",
        config.llm.provider,
        config.llm.base_url,
        config.llm.chat_model
    );
    tracing::info!("Source host: {}", config.github.api_url);

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route(
            "/api/repositories",
            get(api::repositories::list_repositories).post(api::repositories::save_repository),
        )
        .route("/api/repositories/{id}", get(api::repositories::get_repository))
        .route(
            "/api/repositories/{id}/analysis",
            get(api::repositories::latest_analysis),
        )
        .route(
            "/api/repositories/{id}/analyze",
            post(api::analysis::analyze_repository),
        )
        .route("/api/search", post(api::search::search))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
