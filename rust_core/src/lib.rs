//! Auction Watch Core - auction house price matching and notification plumbing.
//!
//! This crate provides:
//! - Domain models for notifications, connected realms and listing snapshots
//! - The price matching engine (threshold, market and average price policies)
//! - Market data provider abstraction with a Battle.net client and retry wrapper
//! - Postgres-backed notification store
//! - Telegram notification sink
//! - Redis command bus and API circuit breaker

pub mod circuit_breaker;
pub mod clients;
pub mod db;
pub mod matching;
pub mod models;
pub mod notify;
pub mod providers;
pub mod redis;
pub mod retry;

pub use matching::evaluate_notification;
pub use models::*;
