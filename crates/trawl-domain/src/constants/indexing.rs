//! Indexing pipeline thresholds.

/// Documents per connector batch handed to the pipeline.
pub const INDEX_BATCH_SIZE: usize = 16;

/// Run-abort threshold: more than this many failures...
pub const FAILURE_COUNT_THRESHOLD: usize = 3;

/// ...AND failures exceeding this fraction of processed documents.
pub const FAILURE_RATIO_THRESHOLD: f64 = 0.10;

/// Documents longer than this (total chars) are dropped by the filter.
pub const MAX_DOCUMENT_CHARS: usize = 5_000_000;

/// Log a warning for documents larger than this before indexing them.
pub const DOCUMENT_SIZE_WARNING_CHARS: usize = 100_000;

/// Chunks at or below this many tokens go through content classification;
/// longer chunks default to a boost factor of 1.0.
pub const CONTENT_CLASSIFICATION_CUTOFF_TOKENS: usize = 10;

/// Default multiplicative boost when classification is skipped or fails.
pub const DEFAULT_CHUNK_BOOST: f32 = 1.0;

/// Overlap subtracted from the poll window start so windowed sources never
/// miss records written while the previous attempt was finishing.
pub const POLL_CONNECTOR_OFFSET_SECS: i64 = 60 * 30;

/// Checkpoint blobs above this size are rejected rather than persisted.
pub const MAX_CHECKPOINT_BYTES: usize = 200_000;

/// Terminal attempts keep their checkpoint blob this long before cleanup.
pub const CHECKPOINT_RETENTION_SECS: i64 = 7 * 24 * 3600;

/// Batch interval for checking checkpoint size growth.
pub const CHECKPOINT_SIZE_CHECK_INTERVAL: usize = 100;
