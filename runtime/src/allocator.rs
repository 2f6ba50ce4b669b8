//! Order id allocation.

use crate::error::EngineError;
use boxoffice_core::OrderId;

/// Issues strictly increasing order ids.
///
/// Seeded with `MAX(existing order id) + 1` so ids never collide with rows
/// already in the backing store. Not synchronised: it lives inside the sale
/// engine's state and is only advanced under the exclusive lock.
///
/// Once `i64::MAX` has been issued the allocator is exhausted and hands out
/// nothing further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAllocator {
    next: Option<OrderId>,
}

impl OrderAllocator {
    /// Allocator for a store whose highest order id is `max_existing`
    /// ([`OrderId::SOLD_OUT`] when there are no orders).
    ///
    /// # Errors
    ///
    /// [`EngineError::OrderIdsExhausted`] when `max_existing` is `i64::MAX`.
    pub fn seeded(max_existing: OrderId) -> Result<Self, EngineError> {
        if max_existing.get() < 0 {
            return Ok(Self { next: Some(OrderId::new(1)) });
        }
        match max_existing.checked_next() {
            Some(next) => Ok(Self { next: Some(next) }),
            None => Err(EngineError::OrderIdsExhausted(max_existing)),
        }
    }

    /// Take the next id, `None` once exhausted.
    pub const fn next_id(&mut self) -> Option<OrderId> {
        let Some(id) = self.next else {
            return None;
        };
        self.next = id.checked_next();
        Some(id)
    }

    /// The id the next call to [`OrderAllocator::next_id`] returns.
    #[must_use]
    pub const fn peek(&self) -> Option<OrderId> {
        self.next
    }
}

impl Default for OrderAllocator {
    fn default() -> Self {
        Self { next: Some(OrderId::new(1)) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_store_starts_at_one() {
        let mut allocator = OrderAllocator::default();
        assert_eq!(allocator.next_id(), Some(OrderId::new(1)));
        assert_eq!(allocator.next_id(), Some(OrderId::new(2)));

        let allocator = OrderAllocator::seeded(OrderId::SOLD_OUT).unwrap();
        assert_eq!(allocator.peek(), Some(OrderId::new(1)));
    }

    #[test]
    fn test_seeded_past_existing_orders() {
        let mut allocator = OrderAllocator::seeded(OrderId::new(41)).unwrap();
        assert_eq!(allocator.peek(), Some(OrderId::new(42)));
        assert_eq!(allocator.next_id(), Some(OrderId::new(42)));
    }

    #[test]
    fn test_issues_last_id_then_stops() {
        let mut allocator = OrderAllocator::seeded(OrderId::new(i64::MAX - 1)).unwrap();
        assert_eq!(allocator.next_id(), Some(OrderId::new(i64::MAX)));
        assert_eq!(allocator.peek(), None);
        assert_eq!(allocator.next_id(), None);
        assert_eq!(allocator.next_id(), None);
    }

    #[test]
    fn test_store_at_max_id_cannot_be_seeded() {
        let err = OrderAllocator::seeded(OrderId::new(i64::MAX)).unwrap_err();
        assert!(matches!(err, EngineError::OrderIdsExhausted(id) if id.get() == i64::MAX));
    }

    proptest! {
        #[test]
        fn prop_ids_strictly_increase(seed in 0i64..1_000_000, count in 1usize..200) {
            let mut allocator = OrderAllocator::seeded(OrderId::new(seed)).unwrap();
            let mut last = OrderId::new(seed);
            for _ in 0..count {
                let id = allocator.next_id().unwrap();
                prop_assert!(id > last);
                prop_assert!(id != OrderId::SOLD_OUT);
                last = id;
            }
        }
    }
}
