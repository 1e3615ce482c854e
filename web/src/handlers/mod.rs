//! HTTP request handlers.

pub mod health;
pub mod reports;

pub use health::{health_check, metrics};
