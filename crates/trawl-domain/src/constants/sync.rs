//! Document sync coordinator limits.

/// Maximum per-document sync tasks generated by one coordinator pass,
/// shared across the stale-document, document-set, and user-group passes.
pub const DOC_SYNC_MAX_TASKS: usize = 8192;

/// Retries for one per-document sync task before giving up.
pub const DOC_SYNC_MAX_RETRIES: u32 = 3;

/// Backoff exponent base offset: retry n sleeps `2^(n + 4)` seconds.
pub const DOC_SYNC_BACKOFF_EXP_OFFSET: u32 = 4;

/// Soft budget for one per-document sync task; backoff never sleeps past it.
pub const DOC_SYNC_SOFT_LIMIT_SECS: u64 = 105;
