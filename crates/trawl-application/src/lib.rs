//! Trawl Application Layer
//!
//! The use cases of the ingestion & sync orchestrator, written against the
//! domain ports only:
//!
//! - [`coordination`] — the fence protocol over the KV broker: fences,
//!   tasksets, completion signals, heartbeats, and the active-fence
//!   registry.
//! - [`runtime`] — the connector runtime: retry combinator, resilient
//!   pagination, the checkpoint loop runner, image-section processing.
//! - [`indexing`] — the indexing pipeline, attempt driver, and the
//!   watchdog supervising spawned children.
//! - [`sync`] — the document-level sync coordinator and per-document sync
//!   worker.
//! - [`beat`] — the periodic schedulers: indexing kickoff/validation/
//!   finalization and checkpoint retention cleanup.
//!
//! Everything is tenant-scoped through the explicit [`context::TenantContext`]
//! value; there is no ambient state.

pub mod beat;
pub mod context;
pub mod coordination;
pub mod indexing;
pub mod runtime;
pub mod sync;
pub mod tasks;
