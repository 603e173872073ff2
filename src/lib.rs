//! Streamgate - Entitlement service for subscription streaming apps
//!
//! This library provides the core functionality for the streamgate service:
//! payment reconciliation, redemption codes, subscriptions, device limits,
//! and TV pairing, backed by SQLite.

pub mod codes;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod grant;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod outcome;
pub mod plan;
pub mod rate_limit;
pub mod util;
