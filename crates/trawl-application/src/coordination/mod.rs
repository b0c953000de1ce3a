//! The fence protocol.
//!
//! # Overview
//! A *fence* is a KV key whose presence means "this work unit is claimed."
//! Around each fence live a taskset (outstanding subtask ids), a
//! generator-complete key (producer's terminal signal), short-TTL
//! liveness heartbeats, and terminate signals. The tenant-wide
//! *active-fence registry* lists every live fence so the beats can
//! finalize work without scanning the keyspace.
//!
//! # Invariants
//! - `set_fence(Some(_))` adds the fence to the registry in the same call;
//!   `set_fence(None)` removes it from the registry before returning.
//! - The producer writes the generator-complete key before any observer
//!   may treat the work as done.
//! - Keys under a fence namespace are written only by the fence owner.

mod indexing_fence;
mod registry;
mod sync_fence;

pub use indexing_fence::{IndexingFence, IndexingFencePayload};
pub use registry::{reconcile_registry, registry_members};
pub use sync_fence::{CcPairSyncTaskGenerator, DocumentSetFence, GlobalDocSyncFence, UserGroupFence};
