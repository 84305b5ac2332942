//! Tier classification for runs.
//!
//! A run's tier is never stored. It is recomputed from `(status, created_at, now)`
//! every time a record is written or read back.

use chrono::{DateTime, Duration, Utc};

use crate::{RunStatus, StoreTier};

/// Age after which a non-terminal run is treated as stuck, in seconds.
pub const STALENESS_THRESHOLD_SECS: i64 = 2 * 60 * 60;

/// Age after which a non-terminal run is treated as stuck.
pub fn staleness_threshold() -> Duration {
    Duration::seconds(STALENESS_THRESHOLD_SECS)
}

/// Decide which tier a run belongs in.
///
/// Terminal runs and non-terminal runs older than the staleness threshold are
/// durable. Everything else is ephemeral. A `created_at` in the future counts
/// as age zero.
pub fn classify(status: RunStatus, created_at: DateTime<Utc>, now: DateTime<Utc>) -> StoreTier {
    if status.is_terminal() {
        return StoreTier::Durable;
    }
    let age = now.signed_duration_since(created_at);
    if age > staleness_threshold() {
        StoreTier::Durable
    } else {
        StoreTier::Ephemeral
    }
}
