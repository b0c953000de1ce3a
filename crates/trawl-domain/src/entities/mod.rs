//! Domain Entities
//!
//! Plain data records for everything the orchestrator owns or reads.
//! Repository functions (not the entities) talk to the relational store,
//! so there is no lazy loading anywhere: every N+1 hazard is explicit at
//! the call site.

mod access;
mod ccpair;
mod checkpoint;
mod chunk;
mod document;
mod index_attempt;
mod search_settings;
mod sync;

pub use access::DocumentAccess;
pub use ccpair::{AccessType, CcPairStatus, ConnectorCredentialPair, IndexingTrigger};
pub use checkpoint::ConnectorCheckpoint;
pub use chunk::{ChunkEmbeddings, DocAwareChunk, DocMetadataAwareIndexChunk, UpdatableChunkData};
pub use document::{
    Document, DocumentMetadata, DocumentRow, DocumentSource, IndexingDocument, MetadataValue,
    ProcessedSection, Section, SlimDocument,
};
pub use index_attempt::{
    ConnectorFailure, DocumentFailure, EntityFailure, IndexAttempt, IndexAttemptError,
    IndexAttemptStatus, NewIndexAttempt,
};
pub use search_settings::{SearchSettings, SearchSettingsStatus};
pub use sync::{DocumentSet, SyncRecord, SyncStatus, SyncType, UserGroup};
