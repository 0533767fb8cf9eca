use clap::Parser;
use taskdeck_server::{app, config::ServerConfig, errors::ServerResult, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ServerResult<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskdeck_server=debug,tower_http=debug")),
        )
        .init();

    let state = match AppState::connect(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(%e, database_url = %config.database_url, "Failed to initialize database");
            return Err(e);
        }
    };

    let addr = config.bind_address.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%e, addr = %addr, "Failed to bind");
            return Err(e.into());
        }
    };

    tracing::info!("Starting taskdeck server on {}", addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
