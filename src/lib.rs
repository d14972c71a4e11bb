//! Floodgate - Request Rate Limiting for HTTP Applications
//!
//! This crate implements a rate limiter that sits in front of an HTTP
//! application. Requests are counted per client address and per credential
//! token in an external counter store, and are rejected with 429 once an
//! identity exceeds its quota within a window that opens at its first request.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod server;
pub mod store;
