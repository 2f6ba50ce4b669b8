//! SQL scripts bundled with the store.
//!
//! The schema itself lives in `migrations/` and is applied by
//! [`PostgresBackingStore::migrate`](crate::PostgresBackingStore::migrate).
//! A seat label is stored as `stock.seat_id`, and a stock row is sold once
//! `order_id` is set.

/// Demo dataset: 2 artists, 4 tickets, 8 variations of 4096 seats.
pub const DEMO_DATA: &str = include_str!("../sql/demo_data.sql");

/// Default reinitialization when no initial data script is configured:
/// forget every order, put every seat back on sale.
pub(crate) const CLEAR_ORDERS: &str = r"
UPDATE stock SET order_id = NULL, updated_at = now() WHERE order_id IS NOT NULL;
DELETE FROM order_request;
";
