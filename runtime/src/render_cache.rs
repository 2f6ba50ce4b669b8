//! Periodically refreshed page renderings.
//!
//! Each page kind gets ONE refresher task. On every tick it takes a single
//! [`SaleEngine::view`], renders every key from that view without holding any
//! lock, and publishes the complete table through a `watch` channel. Readers
//! borrow the latest table and never touch the sale lock.
//!
//! Pages are at most one refresh interval stale. A key that has no entry yet
//! (e.g. a ticket added by a reset since the last tick) is rendered on demand
//! from a fresh view. Keys the catalog does not know are rejected before any
//! view is taken.
//!
//! Renderers that only show counts get a [`SaleEngine::counts_view`], so the
//! per-seat label sets are copied only for pages that draw a seat map.

use crate::engine::{InventoryView, SaleEngine};
use boxoffice_core::Catalog;
use crate::metrics::RenderMetrics;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Renders one kind of page from an [`InventoryView`].
pub trait PageRenderer: Send + Sync + 'static {
    /// Page key (e.g. a ticket id)
    type Key: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Short name used in logs and metrics, e.g. `"ticket"`
    fn kind(&self) -> &'static str;

    /// Every key that has a page in `view`
    fn keys(&self, view: &InventoryView) -> Vec<Self::Key>;

    /// Whether `catalog` has a page for `key`
    fn exists(&self, catalog: &Catalog, key: Self::Key) -> bool;

    /// Whether pages read [`InventoryView::is_available`]
    fn needs_seat_map(&self) -> bool {
        true
    }

    /// Render the page for `key`, `None` when `view` has no such page
    fn render(&self, view: &InventoryView, key: Self::Key) -> Option<String>;
}

/// Render cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCacheConfig {
    /// Time between refreshes
    pub interval: Duration,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
        }
    }
}

type PageTable<K> = Arc<HashMap<K, Arc<str>>>;

/// Read side of one page kind's cache. Cheap to clone.
pub struct RenderCache<R: PageRenderer> {
    engine: SaleEngine,
    renderer: Arc<R>,
    pages: watch::Receiver<PageTable<R::Key>>,
}

impl<R: PageRenderer> Clone for RenderCache<R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            renderer: Arc::clone(&self.renderer),
            pages: self.pages.clone(),
        }
    }
}

impl<R: PageRenderer> Debug for RenderCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("kind", &self.renderer.kind())
            .field("pages", &self.pages.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<R: PageRenderer> RenderCache<R> {
    /// Start the refresher task for `renderer`.
    ///
    /// The first refresh runs immediately. The task stops when `shutdown`
    /// turns `true` or its sender is dropped.
    pub fn spawn(
        engine: SaleEngine,
        renderer: R,
        config: RenderCacheConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let renderer = Arc::new(renderer);
        let (publisher, pages) = watch::channel(PageTable::default());

        let task = {
            let engine = engine.clone();
            let renderer = Arc::clone(&renderer);
            tokio::spawn(async move {
                let kind = renderer.kind();
                let mut ticker = tokio::time::interval(config.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                if *shutdown.borrow_and_update() {
                    return;
                }
                tracing::info!(kind, interval_ms = config.interval.as_millis(), "Render refresher started");

                loop {
                    tokio::select! {
                        biased;

                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }

                        _ = ticker.tick() => {
                            let table = refresh(&engine, renderer.as_ref()).await;
                            publisher.send_replace(Arc::new(table));
                        }
                    }
                }

                tracing::info!(kind, "Render refresher stopped");
            })
        };

        (
            Self {
                engine,
                renderer,
                pages,
            },
            task,
        )
    }

    /// The page for `key`: the cached rendering, else a synchronous render.
    ///
    /// `None` when no such page exists.
    pub async fn get(&self, key: R::Key) -> Option<Arc<str>> {
        if let Some(page) = self.pages.borrow().get(&key) {
            return Some(Arc::clone(page));
        }

        if !self.renderer.exists(&*self.engine.catalog().await, key) {
            return None;
        }

        let view = view_for(&self.engine, self.renderer.as_ref()).await;
        let page = self.renderer.render(&view, key)?;
        RenderMetrics::record_fallback(self.renderer.kind());
        tracing::debug!(kind = self.renderer.kind(), ?key, "Rendered page on cache miss");
        Some(Arc::from(page))
    }

    /// Number of pages in the current table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.borrow().len()
    }

    /// Whether no refresh has produced a page yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn view_for<R: PageRenderer>(engine: &SaleEngine, renderer: &R) -> InventoryView {
    if renderer.needs_seat_map() {
        engine.view().await
    } else {
        engine.counts_view().await
    }
}

async fn refresh<R: PageRenderer>(engine: &SaleEngine, renderer: &R) -> HashMap<R::Key, Arc<str>> {
    let view = view_for(engine, renderer).await;
    let started = Instant::now();

    let table: HashMap<_, _> = renderer
        .keys(&view)
        .into_iter()
        .filter_map(|key| renderer.render(&view, key).map(|page| (key, Arc::from(page))))
        .collect();

    RenderMetrics::record_refresh(renderer.kind(), started.elapsed());
    table
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::write_behind::{WriteBehindConfig, WriteBehindQueue};
    use boxoffice_core::{TicketId, VariationId};
    use boxoffice_testing::{InMemoryBackingStore, fixtures};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RemainingPage {
        renders: Arc<AtomicUsize>,
        seat_map_seen: Arc<AtomicBool>,
    }

    impl PageRenderer for RemainingPage {
        type Key = TicketId;

        fn kind(&self) -> &'static str {
            "remaining"
        }

        fn keys(&self, view: &InventoryView) -> Vec<TicketId> {
            view.catalog().tickets().map(|t| t.id).collect()
        }

        fn exists(&self, catalog: &Catalog, key: TicketId) -> bool {
            catalog.ticket(key).is_some()
        }

        fn needs_seat_map(&self) -> bool {
            false
        }

        fn render(&self, view: &InventoryView, key: TicketId) -> Option<String> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if view.has_seat_map() {
                self.seat_map_seen.store(true, Ordering::SeqCst);
            }
            view.catalog().ticket(key)?;
            Some(view.remaining_for_ticket(key).to_string())
        }
    }

    async fn engine() -> SaleEngine {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::festival(1, 2, 1, 4)));
        let (handle, worker) = WriteBehindQueue::new(store.clone(), WriteBehindConfig::default());
        let (_tx, rx) = watch::channel(false);
        tokio::spawn(worker.run(rx));
        SaleEngine::bootstrap(store.as_ref(), handle, EngineOptions::default())
            .await
            .unwrap()
    }

    fn config() -> RenderCacheConfig {
        RenderCacheConfig {
            interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_refresh_publishes_every_key() {
        let engine = engine().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cache, task) = RenderCache::spawn(engine.clone(), RemainingPage::default(), config(), shutdown_rx);

        let mut pages = cache.pages.clone();
        pages.wait_for(|table| table.len() == 2).await.unwrap();
        assert_eq!(cache.get(TicketId::new(1)).await.as_deref(), Some("4"));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_pages_catch_up_with_sales() {
        let engine = engine().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cache, _task) = RenderCache::spawn(engine.clone(), RemainingPage::default(), config(), shutdown_rx);

        engine.sell("m1", VariationId::new(1)).await;

        let mut pages = cache.pages.clone();
        pages
            .wait_for(|table| table.get(&TicketId::new(1)).is_some_and(|p| &**p == "3"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_miss_falls_back_and_unknown_is_none() {
        let engine = engine().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let page = RemainingPage::default();
        let renders = Arc::clone(&page.renders);
        let (cache, task) = RenderCache::spawn(engine, page, config(), shutdown_rx);

        // Shut down before the first tick: the table stays empty.
        task.await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get(TicketId::new(2)).await.as_deref(), Some("4"));
        assert!(cache.get(TicketId::new(99)).await.is_none());
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_keys_are_rejected_without_rendering() {
        let engine = engine().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let page = RemainingPage::default();
        let renders = Arc::clone(&page.renders);
        let (cache, task) = RenderCache::spawn(engine, page, config(), shutdown_rx);
        task.await.unwrap();

        for id in 100..200 {
            assert!(cache.get(TicketId::new(id)).await.is_none());
        }
        assert_eq!(renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_count_pages_render_without_seat_map() {
        let engine = engine().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let page = RemainingPage::default();
        let seat_map_seen = Arc::clone(&page.seat_map_seen);
        let renders = Arc::clone(&page.renders);
        let (cache, _task) = RenderCache::spawn(engine, page, config(), shutdown_rx);

        let mut pages = cache.pages.clone();
        pages.wait_for(|table| table.len() == 2).await.unwrap();

        assert!(renders.load(Ordering::SeqCst) >= 2);
        assert!(!seat_map_seen.load(Ordering::SeqCst));
    }
}
