//! The recent-sales feed.

use boxoffice_core::SaleSummary;
use std::collections::VecDeque;

/// Number of sales the feed keeps.
pub const RECENT_SALES_CAPACITY: usize = 10;

/// The most recent sales, newest first, capped at [`RECENT_SALES_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentSales {
    entries: VecDeque<SaleSummary>,
}

impl RecentSales {
    /// Empty feed
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(RECENT_SALES_CAPACITY),
        }
    }

    /// Feed bootstrapped from persisted history, newest first. Entries past the
    /// cap are ignored.
    #[must_use]
    pub fn from_history(history: Vec<SaleSummary>) -> Self {
        let mut entries: VecDeque<_> = history.into_iter().take(RECENT_SALES_CAPACITY).collect();
        entries.reserve(RECENT_SALES_CAPACITY.saturating_sub(entries.len()));
        Self { entries }
    }

    /// Record a sale as the newest entry, evicting the oldest when full.
    pub fn push(&mut self, sale: SaleSummary) {
        if self.entries.len() == RECENT_SALES_CAPACITY {
            self.entries.pop_back();
        }
        self.entries.push_front(sale);
    }

    /// Copy of the feed, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SaleSummary> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sale has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::OrderId;

    fn sale(id: i64) -> SaleSummary {
        SaleSummary {
            order_id: OrderId::new(id),
            artist_name: "artist".into(),
            ticket_name: "ticket".into(),
            variation_name: "variation".into(),
            seat_label: format!("00-{id:02}"),
        }
    }

    fn ids(feed: &RecentSales) -> Vec<i64> {
        feed.snapshot().iter().map(|s| s.order_id.get()).collect()
    }

    #[test]
    fn test_newest_first() {
        let mut feed = RecentSales::new();
        feed.push(sale(1));
        feed.push(sale(2));
        feed.push(sale(3));

        assert_eq!(ids(&feed), [3, 2, 1]);
    }

    #[test]
    fn test_eleventh_sale_evicts_oldest() {
        let mut feed = RecentSales::new();
        for id in 1..=11 {
            feed.push(sale(id));
        }

        assert_eq!(feed.len(), RECENT_SALES_CAPACITY);
        assert_eq!(ids(&feed), [11, 10, 9, 8, 7, 6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_from_history_truncates() {
        let feed = RecentSales::from_history((1..=15).rev().map(sale).collect());
        assert_eq!(ids(&feed), [15, 14, 13, 12, 11, 10, 9, 8, 7, 6]);

        assert!(RecentSales::from_history(Vec::new()).is_empty());
    }
}
