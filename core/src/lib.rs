//! # Boxoffice Core
//!
//! Domain types and ports for the boxoffice sale engine.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Identifiers**: `ArtistId`, `TicketId`, `VariationId`, `StockId`, `OrderId`
//! - **Catalog**: the Artist → Ticket → Variation hierarchy, fixed after load
//! - **Sale records**: `Seat`, `Order`, `SaleSummary`
//! - **`BackingStore`**: the port the engine loads from and writes behind to
//!
//! ## Hierarchy
//!
//! ```text
//! Artist ──< Ticket ──< Variation ──< Seat (unsold stock)
//!                                       │
//!                                       └── sold once ──> Order
//! ```
//!
//! Every variation belongs to exactly one ticket and every ticket to exactly
//! one artist. [`catalog::Catalog::from_rows`] enforces this when the catalog
//! is (re)loaded.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backing_store;
pub mod catalog;
pub mod types;

// Re-export commonly used types
pub use backing_store::{BackingStore, BackingStoreError, StoreSnapshot};
pub use catalog::{Catalog, CatalogError, VariationPath};
pub use chrono::{DateTime, Utc};
pub use types::*;

/// Environment module - time abstraction shared by stores and tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use boxoffice_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
