//! Application state shared by all handlers.

use crate::pages::{ArtistPage, TicketPage, TopPage};
use boxoffice_core::BackingStore;
use boxoffice_runtime::{RenderCache, RenderCacheConfig, SaleEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Render caches for the three browsing pages.
#[derive(Clone, Debug)]
pub struct PageCaches {
    /// `GET /`
    pub top: RenderCache<TopPage>,
    /// `GET /artist/:id`
    pub artists: RenderCache<ArtistPage>,
    /// `GET /ticket/:id`
    pub tickets: RenderCache<TicketPage>,
}

impl PageCaches {
    /// Start one refresher per page kind.
    ///
    /// The refreshers stop when `shutdown` turns `true`; await the returned
    /// handles to wait for them.
    #[must_use]
    pub fn spawn(
        engine: &SaleEngine,
        config: RenderCacheConfig,
        shutdown: &watch::Receiver<bool>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (top, top_task) = RenderCache::spawn(engine.clone(), TopPage, config, shutdown.clone());
        let (artists, artists_task) =
            RenderCache::spawn(engine.clone(), ArtistPage, config, shutdown.clone());
        let (tickets, tickets_task) =
            RenderCache::spawn(engine.clone(), TicketPage, config, shutdown.clone());

        (
            Self {
                top,
                artists,
                tickets,
            },
            vec![top_task, artists_task, tickets_task],
        )
    }
}

/// Application state shared across all HTTP handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The sale engine
    pub engine: SaleEngine,
    /// Backing store, for the CSV export and the admin reset
    pub store: Arc<dyn BackingStore>,
    /// Cached browsing pages
    pub pages: PageCaches,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("pages", &self.pages)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: SaleEngine, store: Arc<dyn BackingStore>, pages: PageCaches) -> Self {
        Self {
            engine,
            store,
            pages,
            metrics: None,
        }
    }

    /// Serve `handle` on `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
