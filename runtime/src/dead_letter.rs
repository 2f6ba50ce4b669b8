//! Dead letter queue for orders the write-behind queue could not persist.
//!
//! A sale is never rolled back: once the seat has left memory the order is the
//! only record of it. Orders that were rejected at enqueue (queue full or
//! consumer gone) or that exhausted their retries land here so an operator
//! can inspect and replay them.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Dead letter queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter<T> {
    /// The payload that could not be processed
    pub payload: T,
    /// Number of retries before giving up (0 when rejected at enqueue)
    pub retry_count: usize,
    /// The last error message
    pub error_message: String,
    /// When the entry was dead-lettered
    pub failed_at: DateTime<Utc>,
}

/// Bounded, thread-safe dead letter queue.
///
/// FIFO; the oldest entry is dropped when the queue is full. Clones share the
/// same storage.
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead letter queue holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size,
        }
    }

    /// Push a failed payload, dropping the oldest entry when full.
    pub fn push(&self, payload: T, error_message: impl Into<String>, retry_count: usize) {
        let error_message = error_message.into();
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        if self.max_size == 0 {
            metrics::counter!("dlq_dropped_total").increment(1);
            tracing::error!(error = %error_message, "Dead letter queue disabled, entry lost");
            return;
        }

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("dlq_dropped_total").increment(1);
            tracing::warn!(max_size = self.max_size, "DLQ at capacity, dropping oldest entry");
        }

        queue.push_back(DeadLetter {
            payload,
            retry_count,
            error_message,
            failed_at: Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dlq_size").set(queue.len() as f64);
        metrics::counter!("dlq_pushed_total").increment(1);

        tracing::warn!(
            retry_count,
            queue_size = queue.len(),
            "Order added to dead letter queue"
        );
    }

    /// Current number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every entry, oldest first.
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();

        metrics::gauge!("dlq_size").set(0.0);
        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// Oldest entry, without removing it
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter<T>>
    where
        T: Clone,
    {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .front()
            .cloned()
    }

    /// Maximum number of entries
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}
