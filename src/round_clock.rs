//! Round clock — wall-clock time to round-id mapping
//!
//! A round is one UTC day, identified by its day-index since the Unix epoch.
//! This arithmetic is the shared contract with the on-chain ledger: the
//! contract computes the same `timestamp / 86400` day boundary, and any
//! divergence here would settle the wrong round.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Seconds in one round (one UTC day).
pub const ROUND_DURATION_SECS: i64 = 86_400;

/// Round id for a given unix timestamp (seconds).
pub fn round_id_at(unix_secs: i64) -> i64 {
    unix_secs.div_euclid(ROUND_DURATION_SECS)
}

/// Round id for the current wall-clock time. Non-decreasing.
pub fn current_round_id() -> i64 {
    round_id_at(Utc::now().timestamp())
}

/// First second of a round.
pub fn round_start(round_id: i64) -> i64 {
    round_id * ROUND_DURATION_SECS
}

/// Last second of a round.
pub fn round_end(round_id: i64) -> i64 {
    (round_id + 1) * ROUND_DURATION_SECS - 1
}

/// Calendar date of a round (UTC).
pub fn round_date(round_id: i64) -> NaiveDate {
    timestamp(round_start(round_id)).date_naive()
}

fn timestamp(unix_secs: i64) -> DateTime<Utc> {
    // In range for any i64 round id this engine will ever see.
    Utc.timestamp_opt(unix_secs, 0).single().unwrap_or_default()
}
