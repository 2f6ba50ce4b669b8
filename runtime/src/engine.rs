//! The sale engine.
//!
//! [`SaleEngine`] owns the catalog, the inventory, the order allocator and the
//! recent-sales feed behind ONE `tokio::sync::RwLock`. Selling a seat takes the
//! write half for a short, synchronous critical section:
//!
//! 1. take a seat from the variation's pool
//! 2. allocate the next order id
//! 3. push the denormalised summary onto the feed
//! 4. hand the order to the write-behind queue (`try_send`, never waits)
//!
//! Reads take the read half once per call, so every read is a consistent
//! point-in-time view. A reset takes the write half for its whole duration and
//! swaps the state only after the new snapshot has been loaded and validated.

use crate::allocator::OrderAllocator;
use crate::error::EngineError;
use crate::feed::{RECENT_SALES_CAPACITY, RecentSales};
use crate::health::{HealthCheck, HealthStatus};
use crate::inventory::InventoryStore;
use crate::metrics::SaleMetrics;
use crate::write_behind::WriteBehindHandle;
use boxoffice_core::{
    BackingStore, Catalog, Order, OrderId, SaleSummary, StoreSnapshot, TicketId, VariationId,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Seed for the seat shuffles; `None` draws one from the OS.
    pub shuffle_seed: Option<u64>,
    /// How long a reset waits for the write-behind queue to drain. Sales
    /// are blocked for at most this long.
    pub flush_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            shuffle_seed: None,
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// What a successful sale hands back to the buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReceipt {
    /// Order id, never [`OrderId::SOLD_OUT`]
    pub order_id: OrderId,
    /// Seat label
    pub seat_label: String,
    /// Artist display name
    pub artist_name: String,
    /// Ticket display name
    pub ticket_name: String,
    /// Variation display name
    pub variation_name: String,
}

/// Result of [`SaleEngine::sell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    /// A seat was sold
    Sold(SaleReceipt),
    /// The variation has no seats left, or does not exist
    SoldOut,
}

impl SaleOutcome {
    /// Whether a seat was sold
    #[must_use]
    pub const fn is_sold(&self) -> bool {
        matches!(self, Self::Sold(_))
    }

    /// `(order id, seat label)`, `(0, "")` when sold out.
    #[must_use]
    pub fn into_parts(self) -> (i64, String) {
        match self {
            Self::Sold(receipt) => (receipt.order_id.get(), receipt.seat_label),
            Self::SoldOut => (OrderId::SOLD_OUT.get(), String::new()),
        }
    }
}

/// Point-in-time copy of everything a page renderer needs.
///
/// Taken under one read-lock acquisition by [`SaleEngine::view`], which
/// includes the seat map, or [`SaleEngine::counts_view`], which carries only
/// per-variation counts.
#[derive(Debug, Clone)]
pub struct InventoryView {
    catalog: Arc<Catalog>,
    remaining: HashMap<VariationId, usize>,
    available: Option<HashMap<VariationId, HashSet<String>>>,
    recent_sales: Vec<SaleSummary>,
}

impl InventoryView {
    /// The catalog at view time
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Unsold seats of a variation (0 when unknown)
    #[must_use]
    pub fn remaining(&self, variation: VariationId) -> usize {
        self.remaining.get(&variation).copied().unwrap_or(0)
    }

    /// Unsold seats across every variation of a ticket
    #[must_use]
    pub fn remaining_for_ticket(&self, ticket: TicketId) -> usize {
        self.catalog
            .ticket(ticket)
            .map_or(0, |t| t.variations.iter().map(|v| self.remaining(v.id)).sum())
    }

    /// Whether the seat labelled `label` is still for sale. Always `false`
    /// in a view without a seat map.
    #[must_use]
    pub fn is_available(&self, variation: VariationId, label: &str) -> bool {
        self.available
            .as_ref()
            .and_then(|available| available.get(&variation))
            .is_some_and(|seats| seats.contains(label))
    }

    /// Whether this view carries the seat map
    #[must_use]
    pub const fn has_seat_map(&self) -> bool {
        self.available.is_some()
    }

    /// Recent sales, newest first
    #[must_use]
    pub fn recent_sales(&self) -> &[SaleSummary] {
        &self.recent_sales
    }
}

struct SaleState {
    catalog: Arc<Catalog>,
    inventory: InventoryStore,
    allocator: OrderAllocator,
    feed: RecentSales,
    rng: StdRng,
}

impl SaleState {
    fn load(snapshot: StoreSnapshot, mut rng: StdRng) -> Result<Self, EngineError> {
        let catalog = Catalog::from_rows(snapshot.catalog)?;
        let inventory = InventoryStore::load(&catalog, snapshot.unsold, &mut rng)?;

        Ok(Self {
            catalog: Arc::new(catalog),
            inventory,
            allocator: OrderAllocator::seeded(snapshot.max_order_id)?,
            feed: RecentSales::from_history(snapshot.recent_sales),
            rng,
        })
    }
}

struct EngineInner {
    state: RwLock<SaleState>,
    persistence: WriteBehindHandle,
    flush_timeout: Duration,
}

/// The in-memory sale engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SaleEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SaleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleEngine")
            .field("persistence", &self.inner.persistence)
            .finish_non_exhaustive()
    }
}

impl SaleEngine {
    /// Load the engine from the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the snapshot cannot be read or is
    /// inconsistent. The process must not serve traffic in that case.
    pub async fn bootstrap(
        store: &dyn BackingStore,
        persistence: WriteBehindHandle,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let rng = options
            .shuffle_seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let snapshot = store.load_snapshot(RECENT_SALES_CAPACITY).await?;
        let state = SaleState::load(snapshot, rng)?;

        tracing::info!(
            artists = state.catalog.artists().len(),
            variations = state.catalog.variation_count(),
            seats = state.inventory.total_remaining(),
            next_order_id = ?state.allocator.peek(),
            "Sale engine loaded"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                state: RwLock::new(state),
                persistence,
                flush_timeout: options.flush_timeout,
            }),
        })
    }

    /// Sell one seat of `variation` to `member_id`.
    ///
    /// Never blocks on the backing store. An unknown variation is sold out.
    pub async fn sell(&self, member_id: &str, variation: VariationId) -> SaleOutcome {
        let started = Instant::now();
        let mut guard = self.inner.state.write().await;
        let state = &mut *guard;

        let Some(path) = state.catalog.variation(variation) else {
            drop(guard);
            tracing::debug!(%variation, "Sale attempt for unknown variation");
            SaleMetrics::record_sold_out(started.elapsed());
            return SaleOutcome::SoldOut;
        };

        let Ok(seat) = state.inventory.take_seat(variation) else {
            drop(guard);
            tracing::debug!(%variation, "Variation sold out");
            SaleMetrics::record_sold_out(started.elapsed());
            return SaleOutcome::SoldOut;
        };

        let Some(order_id) = state.allocator.next_id() else {
            state.inventory.return_seat(variation, seat);
            drop(guard);
            tracing::error!(%variation, "Order ids exhausted, refusing sale");
            SaleMetrics::record_sold_out(started.elapsed());
            return SaleOutcome::SoldOut;
        };
        let receipt = SaleReceipt {
            order_id,
            seat_label: seat.label.clone(),
            artist_name: path.artist.name.clone(),
            ticket_name: path.ticket.name.clone(),
            variation_name: path.variation.name.clone(),
        };
        state.feed.push(SaleSummary {
            order_id,
            artist_name: receipt.artist_name.clone(),
            ticket_name: receipt.ticket_name.clone(),
            variation_name: receipt.variation_name.clone(),
            seat_label: receipt.seat_label.clone(),
        });

        let order = Order {
            id: order_id,
            member_id: member_id.to_owned(),
            seat,
            variation_id: variation,
            ticket_id: path.ticket.id,
            artist_id: path.artist.id,
        };
        // Already dead-lettered and logged on failure; the sale stands.
        let _ = self.inner.persistence.enqueue(order);
        drop(guard);

        SaleMetrics::record_sold(started.elapsed());
        tracing::debug!(%order_id, %variation, seat = %receipt.seat_label, "Seat sold");

        SaleOutcome::Sold(receipt)
    }

    /// Reload catalog, inventory, allocator and feed from the backing store.
    ///
    /// Flushes the write-behind queue first, under the exclusive lock, so no
    /// earlier sale is written after the reload reads the store. Sales wait
    /// for at most [`EngineOptions::flush_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the reload fails; the previous state is kept.
    /// - [`EngineError::FlushTimedOut`]: the queue did not drain in time
    /// - [`EngineError::Flush`]: the consumer has stopped
    pub async fn reset(&self, store: &dyn BackingStore) -> Result<(), EngineError> {
        self.reload(store, false).await
    }

    /// Restore the backing store's initial dataset, then reload from it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Flush`], [`EngineError::FlushTimedOut`]: the queue
    ///   could not be drained; neither the store nor memory changed
    /// - [`EngineError::Reinitialize`]: the store refused; nothing changed in
    ///   memory
    /// - any [`SaleEngine::reset`] error: the store was reinitialized but the
    ///   previous in-memory state is kept
    pub async fn restore_initial(&self, store: &dyn BackingStore) -> Result<(), EngineError> {
        self.reload(store, true).await
    }

    async fn reload(&self, store: &dyn BackingStore, reinitialize: bool) -> Result<(), EngineError> {
        let mut guard = self.inner.state.write().await;

        let timeout = self.inner.flush_timeout;
        let flushed = match tokio::time::timeout(timeout, self.inner.persistence.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(EngineError::Flush(err)),
            Err(_) => Err(EngineError::FlushTimedOut(timeout)),
        };
        if let Err(err) = flushed {
            drop(guard);
            SaleMetrics::record_reset(false);
            tracing::error!(
                reinitialize,
                pending = self.inner.persistence.depth(),
                error = %err,
                "Reload aborted, keeping previous state"
            );
            return Err(err);
        }

        let result: Result<SaleState, EngineError> = async {
            if reinitialize {
                store.reinitialize().await.map_err(EngineError::Reinitialize)?;
            }
            let snapshot = store.load_snapshot(RECENT_SALES_CAPACITY).await?;
            let rng = StdRng::seed_from_u64(guard.rng.next_u64());
            SaleState::load(snapshot, rng)
        }
        .await;

        match result {
            Ok(state) => {
                *guard = state;
                SaleMetrics::record_reset(true);
                tracing::info!(
                    reinitialize,
                    seats = guard.inventory.total_remaining(),
                    next_order_id = ?guard.allocator.peek(),
                    "Sale engine reloaded"
                );
                Ok(())
            }
            Err(err) => {
                SaleMetrics::record_reset(false);
                tracing::error!(reinitialize, error = %err, "Reload failed, keeping previous state");
                Err(err)
            }
        }
    }

    /// Recent sales, newest first.
    pub async fn recent_sales(&self) -> Vec<SaleSummary> {
        self.inner.state.read().await.feed.snapshot()
    }

    /// Unsold seats of a variation (0 when unknown).
    pub async fn remaining(&self, variation: VariationId) -> usize {
        self.inner.state.read().await.inventory.remaining(variation)
    }

    /// Unsold seats per variation of a ticket, in variation order. `None`
    /// when the ticket is unknown.
    pub async fn remaining_for_ticket(&self, ticket: TicketId) -> Option<Vec<(VariationId, usize)>> {
        let state = self.inner.state.read().await;
        let ticket = state.catalog.ticket(ticket)?;
        Some(
            ticket
                .variations
                .iter()
                .map(|v| (v.id, state.inventory.remaining(v.id)))
                .collect(),
        )
    }

    /// Consistent copy of catalog, available seats and feed.
    pub async fn view(&self) -> InventoryView {
        self.snapshot_view(true).await
    }

    /// Like [`SaleEngine::view`] without the seat map: remaining counts only.
    pub async fn counts_view(&self) -> InventoryView {
        self.snapshot_view(false).await
    }

    async fn snapshot_view(&self, seat_map: bool) -> InventoryView {
        let state = self.inner.state.read().await;
        let variations = || state.catalog.tickets().flat_map(|t| t.variations.iter());

        let remaining = variations()
            .map(|v| (v.id, state.inventory.remaining(v.id)))
            .collect();
        let available = seat_map.then(|| {
            variations()
                .map(|v| {
                    let seats =
                        state.inventory.seats(v.id).iter().map(|s| s.label.clone()).collect();
                    (v.id, seats)
                })
                .collect()
        });

        InventoryView {
            catalog: Arc::clone(&state.catalog),
            remaining,
            available,
            recent_sales: state.feed.snapshot(),
        }
    }

    /// The current catalog.
    pub async fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.state.read().await.catalog)
    }

    /// The id the next sale will receive, `None` once ids are exhausted.
    pub async fn next_order_id(&self) -> Option<OrderId> {
        self.inner.state.read().await.allocator.peek()
    }

    /// The write-behind queue this engine feeds.
    #[must_use]
    pub fn persistence(&self) -> &WriteBehindHandle {
        &self.inner.persistence
    }

    /// Health of the inventory and the write-behind queue.
    pub async fn health(&self) -> Vec<HealthCheck> {
        let seats = self.inner.state.read().await.inventory.total_remaining();
        let inventory = HealthCheck {
            component: "inventory".to_string(),
            status: HealthStatus::Healthy,
            message: Some(format!("{seats} seats unsold")),
        };

        let queue = &self.inner.persistence;
        let dead = queue.dead_letters().len();
        let persistence = if queue.is_closed() {
            HealthCheck::unhealthy("write_behind", "consumer stopped")
        } else if dead > 0 {
            HealthCheck::degraded("write_behind", format!("{dead} orders dead-lettered"))
        } else if queue.depth() * 10 >= queue.capacity() * 9 {
            HealthCheck::degraded(
                "write_behind",
                format!("queue at {}/{}", queue.depth(), queue.capacity()),
            )
        } else {
            HealthCheck::healthy("write_behind")
        };

        vec![inventory, persistence]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::write_behind::{WriteBehindConfig, WriteBehindQueue};
    use boxoffice_testing::{InMemoryBackingStore, fixtures};
    use tokio::sync::watch;

    async fn engine_with(
        store: &Arc<InMemoryBackingStore>,
    ) -> (SaleEngine, watch::Sender<bool>) {
        let (handle, worker) = WriteBehindQueue::new(store.clone(), WriteBehindConfig::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(worker.run(shutdown_rx));
        let options = EngineOptions {
            shuffle_seed: Some(42),
            ..EngineOptions::default()
        };
        let engine = SaleEngine::bootstrap(store.as_ref(), handle, options).await.unwrap();
        (engine, shutdown_tx)
    }

    #[tokio::test]
    async fn test_sell_until_sold_out() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(2)));
        let (engine, _shutdown) = engine_with(&store).await;
        let variation = VariationId::new(1);

        let first = engine.sell("m1", variation).await;
        let second = engine.sell("m2", variation).await;
        let third = engine.sell("m3", variation).await;

        assert!(first.is_sold() && second.is_sold());
        assert_eq!(third, SaleOutcome::SoldOut);
        assert_eq!(third.into_parts(), (0, String::new()));
        assert_eq!(engine.remaining(variation).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_variation_is_sold_out() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(2)));
        let (engine, _shutdown) = engine_with(&store).await;

        assert_eq!(engine.sell("m1", VariationId::new(999)).await, SaleOutcome::SoldOut);
        assert_eq!(engine.next_order_id().await, Some(OrderId::new(1)));
        assert!(engine.recent_sales().await.is_empty());
    }

    #[tokio::test]
    async fn test_sale_is_persisted_and_fed() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(3)));
        let (engine, _shutdown) = engine_with(&store).await;

        let (order_id, seat_label) = engine.sell("m1", VariationId::new(1)).await.into_parts();
        engine.persistence().flush().await.unwrap();

        let feed = engine.recent_sales().await;
        assert_eq!(feed[0].order_id.get(), order_id);
        assert_eq!(feed[0].variation_name, "Arena");

        let orders = store.recorded_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].member_id, "m1");
        assert_eq!(orders[0].seat.label, seat_label);
    }

    #[tokio::test]
    async fn test_reset_reloads_from_store() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(5)));
        let (engine, _shutdown) = engine_with(&store).await;

        for member in ["a", "b"] {
            engine.sell(member, VariationId::new(1)).await;
        }
        engine.reset(store.as_ref()).await.unwrap();

        assert_eq!(engine.remaining(VariationId::new(1)).await, 3);
        assert_eq!(engine.next_order_id().await, Some(OrderId::new(3)));
        assert_eq!(engine.recent_sales().await.len(), 2);
    }

    #[tokio::test]
    async fn test_restore_initial_returns_every_seat() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(5)));
        let (engine, _shutdown) = engine_with(&store).await;

        engine.sell("a", VariationId::new(1)).await;
        engine.restore_initial(store.as_ref()).await.unwrap();

        assert_eq!(engine.remaining(VariationId::new(1)).await, 5);
        assert_eq!(engine.next_order_id().await, Some(OrderId::new(1)));
        assert!(engine.recent_sales().await.is_empty());
        assert_eq!(store.unsold_count(), 5);
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_state() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(5)));
        let (engine, _shutdown) = engine_with(&store).await;
        engine.sell("a", VariationId::new(1)).await;

        store.set_unavailable(true);
        let err = engine.reset(store.as_ref()).await.unwrap_err();

        assert!(matches!(err, EngineError::Load(_)));
        assert_eq!(engine.remaining(VariationId::new(1)).await, 4);
        assert_eq!(engine.next_order_id().await, Some(OrderId::new(2)));
    }

    #[tokio::test]
    async fn test_remaining_for_ticket() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::festival(1, 1, 2, 3)));
        let (engine, _shutdown) = engine_with(&store).await;
        engine.sell("a", VariationId::new(2)).await;

        let remaining = engine.remaining_for_ticket(TicketId::new(1)).await.unwrap();
        assert_eq!(remaining, [(VariationId::new(1), 3), (VariationId::new(2), 2)]);
        assert!(engine.remaining_for_ticket(TicketId::new(9)).await.is_none());

        let view = engine.view().await;
        assert_eq!(view.remaining_for_ticket(TicketId::new(1)), 5);
    }

    #[tokio::test]
    async fn test_view_tracks_sold_seats() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(3)));
        let (engine, _shutdown) = engine_with(&store).await;

        let (_, label) = engine.sell("a", VariationId::new(1)).await.into_parts();
        let view = engine.view().await;

        assert!(!view.is_available(VariationId::new(1), &label));
        assert_eq!(view.remaining(VariationId::new(1)), 2);
        assert_eq!(view.recent_sales()[0].seat_label, label);
    }

    #[tokio::test]
    async fn test_counts_view_has_no_seat_map() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::festival(1, 1, 2, 3)));
        let (engine, _shutdown) = engine_with(&store).await;
        engine.sell("a", VariationId::new(2)).await;

        let full = engine.view().await;
        let counts = engine.counts_view().await;

        assert!(full.has_seat_map());
        assert!(!counts.has_seat_map());
        assert_eq!(counts.remaining(VariationId::new(2)), 2);
        assert_eq!(counts.remaining_for_ticket(TicketId::new(1)), 5);
        assert_eq!(counts.recent_sales(), full.recent_sales());
        assert!(full.is_available(VariationId::new(1), "00-00"));
        assert!(!counts.is_available(VariationId::new(1), "00-00"));
    }

    #[tokio::test]
    async fn test_health_reports_dead_letters() {
        let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(3)));
        let (engine, _shutdown) = engine_with(&store).await;
        assert!(engine.health().await.iter().all(|c| c.status.is_healthy()));

        store.set_unavailable(true);
        engine.sell("a", VariationId::new(1)).await;
        // Retries run with the default policy (3 retries, 50ms doubling).
        engine.persistence().flush().await.unwrap();

        let checks = engine.health().await;
        assert_eq!(checks[1].status, HealthStatus::Degraded);
    }
}
