//! Coordination timeouts.
//!
//! The relationships matter more than the absolute numbers: the watchdog
//! heartbeat is shorter than the active signal, which is a few multiples of
//! the monitor period; the generator lock outlives any single attempt.

use std::time::Duration;

/// TTL for beat locks; refreshed with `reacquire` inside loops.
pub const BEAT_LOCK_TTL: Duration = Duration::from_secs(120);

/// TTL for the per-attempt generator lock (bounds one indexing attempt).
pub const INDEXING_LOCK_TTL: Duration = Duration::from_secs(3 * 3600);

/// How long the child waits for the fence payload to be populated before
/// exiting with a readiness timeout.
pub const FENCE_READINESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Watchdog supervision loop period.
pub const WATCHDOG_POLL_PERIOD: Duration = Duration::from_secs(5);

/// TTL of the watchdog-alive key; one missed refresh makes the fence stale.
pub const WATCHDOG_ALIVE_TTL: Duration = Duration::from_secs(15);

/// TTL of the active-signal key.
pub const ACTIVE_SIGNAL_TTL: Duration = Duration::from_secs(180);

/// TTL of terminate-signal keys.
pub const TERMINATE_TTL: Duration = Duration::from_secs(600);

/// TTL of the block signal guarding lookup-table rebuilds.
pub const BLOCK_BUILD_FENCE_LOOKUP_TTL: Duration = Duration::from_secs(300);

/// TTL of the block signal guarding indexing-fence validation.
pub const BLOCK_VALIDATE_INDEXING_FENCES_TTL: Duration = Duration::from_secs(60);
