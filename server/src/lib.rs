//! Box office server: configuration, wiring and lifecycle of the sale engine
//! behind its HTTP shell.
//!
//! ```text
//!   Config::from_env()
//!          │
//!          ▼
//!   PostgresBackingStore ──migrate──▶ schema
//!          │
//!          ▼
//!   Application::build ── WriteBehindQueue consumer
//!          │             ├─ SaleEngine::bootstrap (snapshot)
//!          │             └─ PageCaches refreshers
//!          ▼
//!   Application::serve ── axum until SIGINT/SIGTERM, then drain
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::Application;
pub use config::Config;
