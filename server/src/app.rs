//! Application wiring: backing store, write-behind consumer, engine, page
//! caches and router, plus their orderly shutdown.

use crate::config::Config;
use axum::Router;
use boxoffice_core::BackingStore;
use boxoffice_runtime::{EngineError, SaleEngine, WriteBehindQueue};
use boxoffice_web::{AppState, PageCaches, build_router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A bootstrapped box office: engine loaded, background tasks running.
#[derive(Debug)]
pub struct Application {
    router: Router,
    engine: SaleEngine,
    shutdown_tx: watch::Sender<bool>,
    consumer: JoinHandle<()>,
    refreshers: Vec<JoinHandle<()>>,
}

impl Application {
    /// Start the write-behind consumer, load the engine from `store` and
    /// start the page refreshers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the initial snapshot cannot be loaded.
    /// The consumer is stopped before returning.
    pub async fn build(
        config: &Config,
        store: Arc<dyn BackingStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, EngineError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (persistence, worker) = WriteBehindQueue::new(store.clone(), config.write_behind());
        let consumer = tokio::spawn(worker.run(shutdown_rx.clone()));

        let engine =
            match SaleEngine::bootstrap(store.as_ref(), persistence, config.engine_options()).await
            {
                Ok(engine) => engine,
                Err(e) => {
                    error!(error = %e, "Failed to load the initial snapshot");
                    shutdown_tx.send_replace(true);
                    let _ = consumer.await;
                    return Err(e);
                }
            };
        info!(
            variations = engine.catalog().await.variation_count(),
            "Sale engine ready"
        );

        let (pages, refreshers) = PageCaches::spawn(&engine, config.render_cache(), &shutdown_rx);

        let mut state = AppState::new(engine.clone(), store, pages);
        if let Some(handle) = metrics {
            state = state.with_metrics(handle);
        }

        Ok(Self {
            router: build_router(state),
            engine,
            shutdown_tx,
            consumer,
            refreshers,
        })
    }

    /// The HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The sale engine.
    #[must_use]
    pub const fn engine(&self) -> &SaleEngine {
        &self.engine
    }

    /// Serve HTTP on `listener` until `signal` resolves, then shut down.
    ///
    /// # Errors
    ///
    /// Returns the server's I/O error. Background tasks are stopped either way.
    pub async fn serve(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send + 'static,
        drain_timeout: Duration,
    ) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Listening");
        }

        let served = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(signal)
            .await;
        if let Err(e) = &served {
            error!(error = %e, "HTTP server failed");
        }

        self.shutdown(drain_timeout).await;
        served
    }

    /// Stop the refreshers and drain the write-behind queue.
    ///
    /// Returns `false` when the queue did not drain within `timeout`; the
    /// orders still queued are then lost.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        info!("Shutting down background tasks");
        self.shutdown_tx.send_replace(true);

        for refresher in self.refreshers {
            let _ = refresher.await;
        }

        let pending = self.engine.persistence().depth();
        let drained = tokio::time::timeout(timeout, self.consumer).await.is_ok();
        if drained {
            info!(pending, "Write-behind queue drained");
        } else {
            warn!(
                pending,
                timeout_secs = timeout.as_secs(),
                "Write-behind queue did not drain before the shutdown timeout"
            );
        }

        let dead_letters = self.engine.persistence().drain_dead_letters();
        for letter in &dead_letters {
            error!(
                order_id = %letter.payload.id,
                member_id = %letter.payload.member_id,
                error = %letter.error_message,
                "Order was never persisted"
            );
        }

        drained
    }
}
