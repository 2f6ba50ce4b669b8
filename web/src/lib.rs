//! Axum HTTP shell for the boxoffice sale engine.
//!
//! The shell owns no sale logic. Every request maps onto one engine or cache
//! operation:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            HTTP shell (Axum)            │  ← form parsing, HTML, CSV
//! │  GET pages   → RenderCache::get         │  ← never takes the sale lock
//! │  POST /buy   → SaleEngine::sell         │  ← one critical section
//! │  POST /admin → SaleEngine::restore_...  │  ← exclusive reload
//! ├─────────────────────────────────────────┤
//! │            Sale engine (runtime)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_web::{AppState, PageCaches, build_router};
//!
//! let (pages, refreshers) = PageCaches::spawn(&engine, RenderCacheConfig::default(), &shutdown_rx);
//! let app = build_router(AppState::new(engine, store, pages));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pages;
pub mod routes;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use middleware::REQUEST_ID_HEADER;
pub use routes::build_router;
pub use state::{AppState, PageCaches};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
