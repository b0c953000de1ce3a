//! Time helpers.
//!
//! All persisted timestamps are UTC epoch seconds (`i64`), matching the
//! relational schema. `chrono` types appear only at the edges.

use chrono::{DateTime, Utc};

/// Current UTC time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time as epoch seconds.
#[must_use]
pub fn epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Convert epoch seconds to a UTC datetime, clamping negatives to epoch.
#[must_use]
pub fn from_epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs.max(0), 0).unwrap_or_else(Utc::now)
}
