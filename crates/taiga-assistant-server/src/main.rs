mod configuration;
mod error;
mod routes;
mod sse;
mod state;

use configuration::Settings;
use taiga_assistant::providers::factory::provider_factory;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new()?;
    info!(
        provider = %settings.provider.provider_type(),
        language = %settings.assistant.language,
        "loaded configuration"
    );

    let addr = settings.server.socket_addr()?;
    let state = state::AppState::new(
        provider_factory(settings.provider.into_config()),
        settings.assistant,
    );

    // The browser UI is served from elsewhere
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
