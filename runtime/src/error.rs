//! Error types for the sale engine.
//!
//! Sold-out is not an error: it is [`crate::SaleOutcome::SoldOut`]. The types
//! here cover the two real failure classes, bootstrap (fatal for the load
//! attempt) and persistence (logged, never rolled back into memory).

use boxoffice_core::{BackingStoreError, CatalogError, OrderId};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or reloading engine state.
///
/// Any of these aborts the load: a failed reset leaves the previous state in
/// place.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The backing store could not produce a snapshot.
    #[error("Failed to load from backing store: {0}")]
    Load(#[from] BackingStoreError),

    /// The snapshot violates the catalog or stock invariants.
    #[error("Inconsistent catalog data: {0}")]
    Catalog(#[from] CatalogError),

    /// The backing store refused to restore its initial dataset.
    #[error("Failed to reinitialize backing store: {0}")]
    Reinitialize(BackingStoreError),

    /// The write-behind queue could not be flushed before a reload.
    #[error("Failed to flush write-behind queue: {0}")]
    Flush(PersistenceError),

    /// The write-behind queue did not drain within the reset flush timeout.
    #[error("Write-behind queue did not drain within {0:?}")]
    FlushTimedOut(Duration),

    /// The store already holds the highest representable order id.
    #[error("No order ids left after {0}")]
    OrderIdsExhausted(OrderId),
}

/// Errors from the write-behind queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The queue is at capacity; the job was dead-lettered.
    #[error("Write-behind queue is full (capacity {0})")]
    QueueFull(usize),

    /// The consumer has stopped; nothing will drain the queue.
    #[error("Write-behind consumer has stopped")]
    Closed,
}
