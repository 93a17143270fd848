//! Docgate - rate-limited document registration client
//!
//! This crate submits documents to an external registration service while
//! keeping every caller, across all tasks and threads, under a shared limit
//! of N submissions per time window. The limit is enforced by a windowed
//! admission gate that a background task replenishes at each window
//! boundary.

pub mod api;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use api::DocumentClient;
pub use config::ClientConfig;
pub use error::{DocgateError, Result};
