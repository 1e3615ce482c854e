//! Wiring for the CRM reporting service binary.
//!
//! The binary reads [`config::Config`], connects the Postgres, Redis, and
//! Redpanda adapters, points [`sales::HttpSalesClient`] at the sales service,
//! and serves the `reporting-web` router next to one ingestion worker per
//! inbound topic.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]

pub mod config;
pub mod sales;

pub use config::{Config, ConfigError, LogFormat};
pub use sales::HttpSalesClient;
