use anyhow::{Context, Result};
use lamp_control::api::create_app;
use lamp_control::config::{load_config, LampConfig};
use lamp_control::repository::open_repository;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lamp_control=info,tower_http=info".into()),
        )
        .init();

    info!("Lamp control starting...");

    // File config first, then environment overrides
    let mut config = match std::env::var("LAMP_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => LampConfig::default(),
    };
    config.apply_env();

    info!(
        host = %config.server.host,
        port = config.server.port,
        backend = ?config.storage.backend,
        query_timeout_ms = config.storage.query_timeout_ms,
        "Configuration loaded"
    );

    let repository =
        open_repository(&config.storage).context("Failed to initialize lamp repository")?;

    let app = create_app(repository);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Lamp API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Lamp API server error")?;

    info!("Lamp control stopped");
    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

/// Resolve once `signal` fires. A signal that cannot be installed never
/// resolves, so the server keeps running until the process is killed.
async fn wait_for_shutdown<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
            std::future::pending::<()>().await;
        }
    }
}
