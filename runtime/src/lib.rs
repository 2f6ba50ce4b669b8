//! # Boxoffice Runtime
//!
//! The in-memory ticket inventory and sale engine.
//!
//! ## Core Components
//!
//! - **Inventory Store**: per-variation pool of unsold seats, shuffled on load
//! - **Order Allocator**: monotonic order ids seeded from the backing store
//! - **Recent-Sales Feed**: the ten most recent sales, newest first
//! - **Sale Engine**: the single critical section that sells a seat
//! - **Write-Behind Queue**: ordered, single-consumer persistence of sales
//! - **Render Cache**: periodically refreshed pages that never wait on a sale
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌───────────────── RwLock<SaleState> ─────────────────┐
//!  sell() ──────► │ Inventory ─► Allocator ─► Feed ─► enqueue(Order) ───┼──► mpsc ──► consumer ──► BackingStore
//!                 └─────────────────────────────────────────────────────┘
//!                          ▲ read (one acquisition per tick)
//!  refresher ──────────────┘ ──► render ──► watch<Table> ──► get(key)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_runtime::{SaleEngine, EngineOptions, WriteBehindConfig, WriteBehindQueue};
//!
//! let (persistence, worker) = WriteBehindQueue::new(store.clone(), WriteBehindConfig::default());
//! tokio::spawn(worker.run(shutdown_rx));
//!
//! let engine = SaleEngine::bootstrap(store.as_ref(), persistence, EngineOptions::default()).await?;
//! match engine.sell("member-1", VariationId::new(3)).await {
//!     SaleOutcome::Sold(receipt) => println!("seat {}", receipt.seat_label),
//!     SaleOutcome::SoldOut => println!("no seats"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod dead_letter;
pub mod engine;
pub mod error;
pub mod feed;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod render_cache;
pub mod retry;
pub mod write_behind;

pub use allocator::OrderAllocator;
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use engine::{EngineOptions, InventoryView, SaleEngine, SaleOutcome, SaleReceipt};
pub use error::{EngineError, PersistenceError};
pub use feed::{RECENT_SALES_CAPACITY, RecentSales};
pub use health::{HealthCheck, HealthStatus};
pub use inventory::{Exhausted, InventoryStore};
pub use render_cache::{PageRenderer, RenderCache, RenderCacheConfig};
pub use retry::RetryPolicy;
pub use write_behind::{WriteBehindConfig, WriteBehindHandle, WriteBehindQueue, WriteBehindWorker};
