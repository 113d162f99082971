//! Moon extraction timers for SeAT corporations
//!
//! Pulls extraction timers per corporation, reconciles them into a store and
//! serves them through a read-only HTTP API.

pub mod api;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod errors;
pub mod host;
pub mod models;
pub mod seat;
pub mod store;
pub mod sync;
