use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikirace::{
    api::{self, ServerConfig},
    background,
    clock::SystemClock,
    graph::{GraphConfig, WikiClient},
    random::RandomSource,
    state::{AppState, StateConfig},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikirace=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wikirace...");

    let graph_config = GraphConfig::from_env();
    tracing::info!(api = %graph_config.api_url, "Using wiki API");
    let client = WikiClient::new(graph_config)?;

    let state = Arc::new(AppState::new(
        Arc::new(client),
        Arc::new(SystemClock),
        Arc::new(RandomSource::from_entropy()),
        StateConfig::from_env(),
    ));

    // Warm goal pools now and keep them fresh
    background::spawn_goal_pool_refresher(state.clone(), background::POOL_REFRESH_INTERVAL);

    let server = ServerConfig::from_env();
    let app = api::app(state, &server);

    tracing::info!("Listening on http://{}", server.bind_addr);
    let listener = tokio::net::TcpListener::bind(server.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
