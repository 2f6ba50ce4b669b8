//! `PostgreSQL` backing store for the boxoffice sale engine.
//!
//! The engine keeps all live inventory in memory; this crate is where it
//! loads from at startup and on an administrative reset, and where the
//! write-behind consumer persists completed orders.
//!
//! - Schema migrations (`migrations/`) run by [`PostgresBackingStore::migrate`]
//! - One `REPEATABLE READ` transaction per snapshot load
//! - One transaction per recorded order (order row, then stock row)
//! - Re-initialisation from a configured SQL script, or by clearing orders
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_postgres::{PoolSettings, PostgresBackingStore};
//!
//! let store = PostgresBackingStore::connect_with(&url, PoolSettings::default())
//!     .await?
//!     .with_initial_data(std::fs::read_to_string("initial_data.sql")?);
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod schema;
mod store;

pub use schema::DEMO_DATA;
pub use store::{PoolSettings, PostgresBackingStore};
