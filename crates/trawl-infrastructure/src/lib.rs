//! Trawl Infrastructure Layer
//!
//! Process-level plumbing around the application use cases: YAML
//! configuration, `tracing` logging setup, the in-process task queue
//! driver with its handler registry, the tenant router, and the
//! child-process spawner used by indexing watchdogs.

pub mod config;
pub mod logging;
pub mod queue;
pub mod spawn;
pub mod tenant;
