//! Trawl Domain Layer
//!
//! Pure domain types and port definitions for the ingestion & sync
//! orchestrator. This crate contains no I/O: entities are plain data
//! records, ports are `async_trait` interfaces implemented by the
//! infrastructure and provider crates, and the single [`error::Error`]
//! type is shared by every layer.
//!
//! # Layout
//! - [`entities`] — connector-credential pairs, search settings, index
//!   attempts, documents, chunks, checkpoints, sync bookkeeping.
//! - [`value_objects`] — strong-typed identifiers and the tenant context
//!   threaded through every core call.
//! - [`ports`] — KV broker, relational executor + repositories, search
//!   index, inference, connectors, task queue, process spawner.
//! - [`constants`] — KV key namespaces, timeouts, and pipeline thresholds.

pub mod constants;
pub mod entities;
pub mod error;
pub mod ports;
pub mod utils;
pub mod value_objects;

pub use error::{Error, Result};
