//! Write-behind persistence of completed sales.
//!
//! The sale engine enqueues every [`Order`] with a non-blocking `try_send`
//! while it still holds the exclusive lock, so the queue order is the order id
//! order. A single [`WriteBehindWorker`] applies them to the backing store one
//! at a time, in that order.
//!
//! # Failure Handling
//!
//! - Queue full or consumer gone at enqueue: logged, counted, dead-lettered.
//!   The sale itself stands.
//! - [`BackingStore::record_sale`] fails: retried per [`RetryPolicy`]; an
//!   order that still fails is dead-lettered and the consumer moves on.
//!
//! # Shutdown
//!
//! Send `true` on the worker's `watch` channel (or drop the sender). The
//! worker closes the queue, applies everything already in it, then returns.
//!
//! # Example
//!
//! ```ignore
//! let (handle, worker) = WriteBehindQueue::new(store, WriteBehindConfig::default());
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let consumer = tokio::spawn(worker.run(shutdown_rx));
//!
//! handle.enqueue(order)?;
//! handle.flush().await?;
//!
//! shutdown_tx.send(true)?;
//! consumer.await?;
//! ```

use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::error::PersistenceError;
use crate::metrics::PersistenceMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use boxoffice_core::{BackingStore, BackingStoreError, Order};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 65_536;

/// Default dead letter queue size.
pub const DEFAULT_DEAD_LETTER_MAX: usize = 1_000;

/// Write-behind queue configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBehindConfig {
    /// Maximum orders waiting for the consumer
    pub capacity: usize,
    /// Retry policy for each backing store write
    pub retry: RetryPolicy,
    /// Maximum dead-lettered orders kept in memory
    pub dead_letter_max: usize,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            retry: RetryPolicy::default(),
            dead_letter_max: DEFAULT_DEAD_LETTER_MAX,
        }
    }
}

#[derive(Debug)]
enum Command {
    Persist(Order),
    Flush(oneshot::Sender<()>),
}

/// Constructor for a connected handle/worker pair.
#[derive(Debug)]
pub struct WriteBehindQueue;

impl WriteBehindQueue {
    /// Create the queue. Spawn [`WriteBehindWorker::run`] to start consuming.
    #[must_use]
    pub fn new(
        store: Arc<dyn BackingStore>,
        config: WriteBehindConfig,
    ) -> (WriteBehindHandle, WriteBehindWorker) {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let dead_letters = DeadLetterQueue::new(config.dead_letter_max);

        let handle = WriteBehindHandle {
            tx,
            dead_letters: dead_letters.clone(),
        };
        let worker = WriteBehindWorker {
            rx,
            store,
            retry: config.retry,
            dead_letters,
        };

        (handle, worker)
    }
}

/// Producer side of the write-behind queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WriteBehindHandle {
    tx: mpsc::Sender<Command>,
    dead_letters: DeadLetterQueue<Order>,
}

impl WriteBehindHandle {
    /// Queue an order for persistence without waiting.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::QueueFull`]: the queue is at capacity
    /// - [`PersistenceError::Closed`]: the consumer has stopped
    ///
    /// In both cases the order has already been dead-lettered.
    pub fn enqueue(&self, order: Order) -> Result<(), PersistenceError> {
        match self.tx.try_send(Command::Persist(order)) {
            Ok(()) => {
                PersistenceMetrics::record_enqueued();
                PersistenceMetrics::record_depth(self.depth());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(command)) => {
                let capacity = self.tx.max_capacity();
                self.reject(command, "full", format!("write-behind queue full (capacity {capacity})"));
                Err(PersistenceError::QueueFull(capacity))
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                self.reject(command, "closed", "write-behind consumer stopped".to_string());
                Err(PersistenceError::Closed)
            }
        }
    }

    fn reject(&self, command: Command, reason: &'static str, message: String) {
        PersistenceMetrics::record_dropped(reason);
        if let Command::Persist(order) = command {
            tracing::error!(
                order_id = %order.id,
                stock_id = %order.seat.stock_id,
                reason,
                "Order not queued for persistence"
            );
            self.dead_letters.push(order, message, 0);
        }
    }

    /// Wait until every order queued before this call has been applied or
    /// dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Closed`] if the consumer has stopped.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .await
            .map_err(|_| PersistenceError::Closed)?;
        done_rx.await.map_err(|_| PersistenceError::Closed)
    }

    /// Commands waiting for the consumer.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether the consumer has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Orders that could not be persisted.
    #[must_use]
    pub const fn dead_letters(&self) -> &DeadLetterQueue<Order> {
        &self.dead_letters
    }

    /// Remove and return every dead-lettered order.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetter<Order>> {
        self.dead_letters.drain()
    }
}

/// Single consumer of the write-behind queue.
pub struct WriteBehindWorker {
    rx: mpsc::Receiver<Command>,
    store: Arc<dyn BackingStore>,
    retry: RetryPolicy,
    dead_letters: DeadLetterQueue<Order>,
}

impl std::fmt::Debug for WriteBehindWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindWorker")
            .field("retry", &self.retry)
            .field("dead_letters", &self.dead_letters.len())
            .finish_non_exhaustive()
    }
}

impl WriteBehindWorker {
    /// Apply queued orders until shutdown, then drain and return.
    ///
    /// Also returns once every [`WriteBehindHandle`] is dropped and the queue
    /// is empty.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(capacity = self.rx.max_capacity(), "Write-behind consumer started");

        if *shutdown.borrow_and_update() {
            self.drain().await;
            return;
        }

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Write-behind consumer shutting down, draining queue");
                        self.drain().await;
                        break;
                    }
                }

                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.apply(command).await,
                        None => break,
                    }
                }
            }
        }

        tracing::info!(
            dead_letters = self.dead_letters.len(),
            "Write-behind consumer stopped"
        );
    }

    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0usize;
        while let Some(command) = self.rx.recv().await {
            self.apply(command).await;
            drained += 1;
        }
        tracing::info!(drained, "Write-behind queue drained");
    }

    async fn apply(&self, command: Command) {
        match command {
            Command::Persist(order) => self.persist(order).await,
            Command::Flush(done) => {
                // The flusher may have given up waiting.
                let _ = done.send(());
            }
        }
        PersistenceMetrics::record_depth(self.rx.len());
    }

    async fn persist(&self, order: Order) {
        let started = Instant::now();
        let store = &self.store;

        let result = retry_with_predicate(
            &self.retry,
            || store.record_sale(order.clone()),
            |err| !matches!(err, BackingStoreError::InvalidData(_)),
        )
        .await;

        match result {
            Ok(()) => {
                PersistenceMetrics::record_persisted(started.elapsed());
                tracing::debug!(order_id = %order.id, "Order persisted");
            }
            Err(err) => {
                PersistenceMetrics::record_failed();
                tracing::error!(
                    order_id = %order.id,
                    stock_id = %order.seat.stock_id,
                    error = %err,
                    "Failed to persist order"
                );
                let retries = if matches!(err, BackingStoreError::InvalidData(_)) {
                    0
                } else {
                    self.retry.max_retries
                };
                self.dead_letters.push(order, err.to_string(), retries);
            }
        }
    }
}
