//! Backing store port.
//!
//! The engine reads the backing store only at startup and on an administrative
//! reset, and writes to it only from the write-behind consumer. Everything the
//! engine needs is expressed by [`BackingStore`]:
//!
//! - [`BackingStore::load_snapshot`] - catalog, unsold stock, order seed and
//!   feed bootstrap, read consistently in one pass
//! - [`BackingStore::record_sale`] - persist one completed order
//! - [`BackingStore::export_orders`] - every order, for the admin export
//! - [`BackingStore::reinitialize`] - restore the initial dataset
//!
//! # Implementations
//!
//! - `PostgresBackingStore` (in `boxoffice-postgres`): production implementation
//! - `InMemoryBackingStore` (in `boxoffice-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! The trait returns `Pin<Box<dyn Future>>` instead of using `async fn` so that
//! it can be shared as `Arc<dyn BackingStore>` between the engine, the
//! write-behind consumer and the HTTP shell.

use crate::types::{CatalogRows, ExportedOrder, Order, OrderId, SaleSummary, StockRow};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`BackingStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackingStoreError>> + Send + 'a>>;

/// Errors that can occur during backing store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackingStoreError {
    /// Query or connection failure reported by the database.
    #[error("Database error: {0}")]
    Database(String),

    /// The store cannot be reached right now (pool exhausted, stalled, closed).
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// Data read from the store violates an invariant (e.g. a NULL name).
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Everything the engine loads at startup and on reset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Artist, ticket and variation rows
    pub catalog: CatalogRows,
    /// Stock rows without an order
    pub unsold: Vec<StockRow>,
    /// Highest order id present, [`OrderId::SOLD_OUT`] (0) when there are none
    pub max_order_id: OrderId,
    /// Most recent sales, newest first
    pub recent_sales: Vec<SaleSummary>,
}

/// Backing store abstraction for the sale engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one instance is shared by request
/// handlers, the write-behind consumer and the reset path.
pub trait BackingStore: Send + Sync {
    /// Read catalog, unsold stock, the order seed and the newest
    /// `recent_limit` sales as one consistent snapshot.
    ///
    /// # Errors
    ///
    /// - `Database`: a query failed
    /// - `Unavailable`: no connection could be obtained
    /// - `InvalidData`: a row could not be decoded
    fn load_snapshot(&self, recent_limit: usize) -> StoreFuture<'_, StoreSnapshot>;

    /// Persist one completed order: insert the order row, then point the
    /// seat's stock row at it. Both writes land together or not at all.
    ///
    /// Replaying an order that is already recorded for the same seat
    /// succeeds without changing anything, so a retry after a lost commit
    /// acknowledgement is safe.
    ///
    /// # Errors
    ///
    /// - `Database`: either write failed
    /// - `Unavailable`: no connection could be obtained
    /// - `InvalidData`: the seat does not exist or belongs to another order
    fn record_sale(&self, order: Order) -> StoreFuture<'_, ()>;

    /// Every persisted order with its seat, ascending by order id.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    fn export_orders(&self) -> StoreFuture<'_, Vec<ExportedOrder>>;

    /// Restore the initial dataset: no orders, every seat unsold.
    ///
    /// # Errors
    ///
    /// - `Database`: the reset statements failed
    fn reinitialize(&self) -> StoreFuture<'_, ()>;
}
