//! In-memory backing store for fast, deterministic tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use crate::mocks::test_clock;
use boxoffice_core::backing_store::StoreFuture;
use boxoffice_core::environment::Clock;
use boxoffice_core::{
    BackingStore, BackingStoreError, CatalogRows, DateTime, ExportedOrder, Order, OrderId,
    SaleSummary, StockId, StockRow, StoreSnapshot, Utc,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Catalog and stock rows a store starts from (and returns to on
/// [`BackingStore::reinitialize`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    /// Artist, ticket and variation rows
    pub catalog: CatalogRows,
    /// Every stock row, sold or not
    pub stock: Vec<StockRow>,
}

#[derive(Debug)]
struct StoreState {
    catalog: CatalogRows,
    stock: Vec<StockRow>,
    stock_index: HashMap<StockId, usize>,
    /// Orders in the order they were recorded.
    orders: Vec<Order>,
    sold: HashMap<StockId, (OrderId, DateTime<Utc>)>,
}

impl StoreState {
    fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            catalog: dataset.catalog.clone(),
            stock: dataset.stock.clone(),
            stock_index: dataset.stock.iter().enumerate().map(|(i, s)| (s.id, i)).collect(),
            orders: Vec::new(),
            sold: HashMap::new(),
        }
    }

    fn stock(&self, id: StockId) -> Option<&StockRow> {
        self.stock_index.get(&id).map(|&i| &self.stock[i])
    }

    fn summary(&self, order: &Order) -> Option<SaleSummary> {
        let variation = self.catalog.variations.iter().find(|v| v.id == order.variation_id)?;
        let ticket = self.catalog.tickets.iter().find(|t| t.id == variation.ticket_id)?;
        let artist = self.catalog.artists.iter().find(|a| a.id == ticket.artist_id)?;
        let stock = self.stock(order.seat.stock_id)?;

        Some(SaleSummary {
            order_id: order.id,
            artist_name: artist.name.clone(),
            ticket_name: ticket.name.clone(),
            variation_name: variation.name.clone(),
            seat_label: stock.seat_label.clone(),
        })
    }
}

/// In-memory [`BackingStore`].
///
/// # Failure Injection
///
/// - [`InMemoryBackingStore::fail_next_writes`]: the next `n` calls to
///   `record_sale` fail with `Unavailable`
/// - [`InMemoryBackingStore::fail_after_commit`]: the next writes are applied
///   but reported as `Unavailable`
/// - [`InMemoryBackingStore::set_unavailable`]: every call fails
/// - [`InMemoryBackingStore::pause_writes`]: `record_sale` blocks until
///   [`InMemoryBackingStore::resume_writes`]
///
/// # Example
///
/// ```
/// use boxoffice_testing::{InMemoryBackingStore, fixtures};
/// use boxoffice_core::BackingStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryBackingStore::new(fixtures::single_variation(3));
/// let snapshot = store.load_snapshot(10).await?;
/// assert_eq!(snapshot.unsold.len(), 3);
/// # Ok(())
/// # }
/// ```
pub struct InMemoryBackingStore {
    initial: Dataset,
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
    failures: AtomicUsize,
    lost_acks: AtomicUsize,
    unavailable: AtomicBool,
    paused: watch::Sender<bool>,
    record_calls: AtomicUsize,
}

impl std::fmt::Debug for InMemoryBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackingStore")
            .field("state", &self.state)
            .field("failures", &self.failures)
            .field("unavailable", &self.unavailable)
            .finish_non_exhaustive()
    }
}

impl InMemoryBackingStore {
    /// Store holding `dataset`, with no orders.
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self::with_clock(dataset, Arc::new(test_clock()))
    }

    /// Store whose `updated_at` timestamps come from `clock`.
    #[must_use]
    pub fn with_clock(dataset: Dataset, clock: Arc<dyn Clock>) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: RwLock::new(StoreState::from_dataset(&dataset)),
            initial: dataset,
            clock,
            failures: AtomicUsize::new(0),
            lost_acks: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            paused,
            record_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` writes with `Unavailable`.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Apply the next `count` writes, then report them as `Unavailable`,
    /// as a connection dropped after commit would.
    pub fn fail_after_commit(&self, count: usize) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Make every operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Block `record_sale` until [`InMemoryBackingStore::resume_writes`].
    pub fn pause_writes(&self) {
        self.paused.send_replace(true);
    }

    /// Release writes blocked by [`InMemoryBackingStore::pause_writes`].
    pub fn resume_writes(&self) {
        self.paused.send_replace(false);
    }

    /// Add a stock row, as an out-of-band insert would.
    pub fn add_stock(&self, row: StockRow) {
        let mut state = self.state.write().unwrap();
        let position = state.stock.len();
        state.stock_index.insert(row.id, position);
        state.stock.push(row);
    }

    /// Orders in the order they were recorded.
    #[must_use]
    pub fn recorded_orders(&self) -> Vec<Order> {
        self.state.read().unwrap().orders.clone()
    }

    /// Number of `record_sale` calls, failed ones included.
    #[must_use]
    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    /// Number of stock rows without an order.
    #[must_use]
    pub fn unsold_count(&self) -> usize {
        let state = self.state.read().unwrap();
        state.stock.iter().filter(|s| !state.sold.contains_key(&s.id)).count()
    }

    fn check_available(&self) -> Result<(), BackingStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackingStoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        take_one(&self.failures)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl BackingStore for InMemoryBackingStore {
    fn load_snapshot(&self, recent_limit: usize) -> StoreFuture<'_, StoreSnapshot> {
        Box::pin(async move {
            self.check_available()?;
            let state = self.state.read().unwrap();

            let unsold = state
                .stock
                .iter()
                .filter(|s| !state.sold.contains_key(&s.id))
                .cloned()
                .collect();
            let max_order_id = state
                .orders
                .iter()
                .map(|o| o.id)
                .max()
                .unwrap_or(OrderId::SOLD_OUT);

            let mut newest: Vec<&Order> = state.orders.iter().collect();
            newest.sort_by(|a, b| b.id.cmp(&a.id));
            let recent_sales = newest
                .into_iter()
                .take(recent_limit)
                .map(|o| {
                    state.summary(o).ok_or_else(|| {
                        BackingStoreError::InvalidData(format!("order {} has no catalog path", o.id))
                    })
                })
                .collect::<Result<_, _>>()?;

            Ok(StoreSnapshot {
                catalog: state.catalog.clone(),
                unsold,
                max_order_id,
                recent_sales,
            })
        })
    }

    fn record_sale(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.record_calls.fetch_add(1, Ordering::SeqCst);

            let mut paused = self.paused.subscribe();
            let _ = paused.wait_for(|p| !*p).await;

            self.check_available()?;
            if self.take_injected_failure() {
                return Err(BackingStoreError::Unavailable("injected write failure".into()));
            }

            let now = self.clock.now();
            let mut state = self.state.write().unwrap();
            if state.stock(order.seat.stock_id).is_none() {
                return Err(BackingStoreError::InvalidData(format!(
                    "unknown stock {}",
                    order.seat.stock_id
                )));
            }
            match state.sold.get(&order.seat.stock_id) {
                // Replay of a write that already landed.
                Some((sold_to, _)) if *sold_to == order.id => {}
                Some((sold_to, _)) => {
                    return Err(BackingStoreError::InvalidData(format!(
                        "stock {} already sold to order {sold_to}",
                        order.seat.stock_id
                    )));
                }
                None => {
                    state.sold.insert(order.seat.stock_id, (order.id, now));
                    state.orders.push(order);
                }
            }
            drop(state);

            if take_one(&self.lost_acks) {
                return Err(BackingStoreError::Unavailable("connection lost after commit".into()));
            }
            Ok(())
        })
    }

    fn export_orders(&self) -> StoreFuture<'_, Vec<ExportedOrder>> {
        Box::pin(async move {
            self.check_available()?;
            let state = self.state.read().unwrap();

            let mut rows: Vec<ExportedOrder> = state
                .orders
                .iter()
                .filter_map(|o| {
                    let stock = state.stock(o.seat.stock_id)?;
                    let (_, updated_at) = state.sold.get(&stock.id)?;
                    Some(ExportedOrder {
                        order_id: o.id,
                        member_id: o.member_id.clone(),
                        seat_label: stock.seat_label.clone(),
                        variation_id: stock.variation_id,
                        updated_at: *updated_at,
                    })
                })
                .collect();
            rows.sort_by_key(|r| r.order_id);
            Ok(rows)
        })
    }

    fn reinitialize(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            *self.state.write().unwrap() = StoreState::from_dataset(&self.initial);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use boxoffice_core::{ArtistId, Seat, TicketId, VariationId};

    fn order(id: i64, stock: i64) -> Order {
        Order {
            id: OrderId::new(id),
            member_id: "m".into(),
            seat: Seat::new(StockId::new(stock), "ignored"),
            variation_id: VariationId::new(1),
            ticket_id: TicketId::new(1),
            artist_id: ArtistId::new(1),
        }
    }

    #[tokio::test]
    async fn test_snapshot_reflects_sales() {
        let store = InMemoryBackingStore::new(fixtures::single_variation(4));
        store.record_sale(order(7, 2)).await.unwrap();
        store.record_sale(order(9, 4)).await.unwrap();

        let snapshot = store.load_snapshot(1).await.unwrap();
        assert_eq!(snapshot.unsold.len(), 2);
        assert_eq!(snapshot.max_order_id, OrderId::new(9));
        assert_eq!(snapshot.recent_sales.len(), 1);
        assert_eq!(snapshot.recent_sales[0].seat_label, "00-03");
    }

    #[tokio::test]
    async fn test_reinitialize_forgets_orders() {
        let store = InMemoryBackingStore::new(fixtures::single_variation(2));
        store.record_sale(order(1, 1)).await.unwrap();
        store.reinitialize().await.unwrap();

        assert_eq!(store.unsold_count(), 2);
        assert!(store.export_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryBackingStore::new(fixtures::single_variation(2));
        store.fail_next_writes(1);

        assert!(store.record_sale(order(1, 1)).await.is_err());
        assert!(store.record_sale(order(1, 1)).await.is_ok());
        assert_eq!(store.record_calls(), 2);

        store.set_unavailable(true);
        assert!(matches!(
            store.load_snapshot(10).await,
            Err(BackingStoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_export_sorted_by_order_id() {
        let store = InMemoryBackingStore::new(fixtures::single_variation(3));
        store.record_sale(order(5, 3)).await.unwrap();
        store.record_sale(order(2, 1)).await.unwrap();

        let ids: Vec<_> = store.export_orders().await.unwrap().iter().map(|r| r.order_id.get()).collect();
        assert_eq!(ids, [2, 5]);
    }

    #[tokio::test]
    async fn test_replayed_sale_is_accepted_once() {
        let store = InMemoryBackingStore::new(fixtures::single_variation(3));
        store.fail_after_commit(1);

        assert!(store.record_sale(order(1, 2)).await.is_err());
        store.record_sale(order(1, 2)).await.unwrap();

        assert_eq!(store.recorded_orders().len(), 1);
        assert_eq!(store.unsold_count(), 2);
    }

    #[tokio::test]
    async fn test_seat_sold_to_another_order_is_rejected() {
        let store = InMemoryBackingStore::new(fixtures::single_variation(3));
        store.record_sale(order(1, 2)).await.unwrap();

        let err = store.record_sale(order(2, 2)).await.unwrap_err();

        assert!(matches!(err, BackingStoreError::InvalidData(_)));
        assert_eq!(store.recorded_orders().len(), 1);
    }
}
