#![deny(missing_docs)]

//! Core library for the Rusty Extract client and gateway.

/// HTTP routing and REST handlers.
pub mod api;
/// Extraction backend transport.
pub mod backend;
/// Environment-driven configuration management.
pub mod config;
/// Extraction pipeline: cache, polling, and orchestration.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Extraction metrics helpers.
pub mod metrics;

#[cfg(test)]
mod testing;
