//! beacon-core library.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` at application seams; typed errors
//!   (`thiserror`) where callers branch on the failure.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Store access**: every operation takes an explicit [`db::store::EventStore`]
//!   handle. There is no process-wide connection.

pub mod agent;
pub mod aggregate;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod event;
pub mod geo;
pub mod identifier;
pub mod ingest;
pub mod range;
pub mod report;
pub mod zones;

pub use event::OpenEvent;
