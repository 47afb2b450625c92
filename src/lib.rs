//! Ratewarden - Sliding Window Rate Limiting
//!
//! This crate admits or rejects requests per caller identity using an
//! approximate sliding window. Counts live in a shared Redis store and each
//! decision runs as a single atomic script, so any number of processes can
//! enforce one quota without racing past it.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
