//! # Boxoffice Testing
//!
//! Testing utilities for the boxoffice sale engine.
//!
//! This crate provides:
//! - [`InMemoryBackingStore`]: a deterministic backing store with failure
//!   injection and a write stall gate
//! - [`fixtures`]: catalog and stock datasets
//! - [`mocks::FixedClock`]: deterministic time
//! - [`properties`]: proptest strategies
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::{InMemoryBackingStore, fixtures};
//!
//! #[tokio::test]
//! async fn test_sell_one() {
//!     let store = Arc::new(InMemoryBackingStore::new(fixtures::single_variation(3)));
//!     let (persistence, worker) = WriteBehindQueue::new(store.clone(), WriteBehindConfig::default());
//!     let engine = SaleEngine::bootstrap(store.as_ref(), persistence, EngineOptions::default()).await?;
//!
//!     assert!(engine.sell("m1", VariationId::new(1)).await.is_sold());
//! }
//! ```

pub mod fixtures;
mod memory_store;

pub use memory_store::{Dataset, InMemoryBackingStore};

use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Fixed clock at 2012-11-03 10:00:00 UTC
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::from_timestamp(1_351_936_800, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        )
    }
}

/// Test helpers.
pub mod helpers {
    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies.
pub mod properties {
    use proptest::prelude::*;

    /// Member ids as a buyer would type them.
    pub fn member_id() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,16}"
    }

    /// Sequence of `(member, variation index)` purchase attempts.
    pub fn purchases(variations: usize, max_len: usize) -> impl Strategy<Value = Vec<(String, usize)>> {
        prop::collection::vec((member_id(), 0..variations.max(1)), 0..max_len)
    }
}
