//! HTTP request handlers.

pub mod admin;
pub mod buy;
pub mod health;
pub mod pages;

pub use health::health_check;
