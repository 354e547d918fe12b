// EAV Records Server

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eav_records::{app_state::AppState, config::Config, web::create_eav_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(&config).await?;

    let app = create_eav_router(app_state);

    let addr = config.server_address();
    tracing::info!(database = %config.database.url, "EAV records server starting on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
