use courier_server::ServerConfig;
use courier_shared::constants::APP_NAME;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,courier_server=debug,courier_store=info")
            }),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Start everything, then wait for Ctrl+C
    // -----------------------------------------------------------------------
    let running = courier_server::launch(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    running.shutdown().await;
    Ok(())
}
