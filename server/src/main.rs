//! Box office HTTP server.

use anyhow::Context;
use boxoffice_core::BackingStore;
use boxoffice_postgres::PostgresBackingStore;
use boxoffice_runtime::metrics::MetricsServer;
use boxoffice_server::{Application, Config, telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    telemetry::init_tracing(&config.server.log_level);

    info!("Starting box office server");
    info!(
        bind = %config.bind_address(),
        initial_data = ?config.database.initial_data_path,
        metrics = config.server.metrics_enabled,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;

    let metrics = if config.server.metrics_enabled {
        let mut server = MetricsServer::new(listener.local_addr()?);
        server.start()?;
        server.handle().cloned()
    } else {
        None
    };

    info!("Connecting to backing store...");
    let mut store =
        PostgresBackingStore::connect_with(&config.database.url, config.pool_settings()).await?;
    store.migrate().await?;
    if let Some(path) = &config.database.initial_data_path {
        let script = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading initial data from {path}"))?;
        store = store.with_initial_data(script);
    }
    info!("Backing store ready");

    let store: Arc<dyn BackingStore> = Arc::new(store);
    let app = Application::build(&config, store, metrics).await?;

    app.serve(listener, shutdown_signal(), config.shutdown_timeout())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
