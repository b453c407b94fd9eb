//! Database row types for rounds, entries, and engagement snapshots.
//!
//! These map directly to Postgres table rows via `sqlx::FromRow`. The
//! off-chain rows are a projection of the on-chain ledger state and must
//! eventually match it after settlement.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;

/// Prefix marking a temporary content identifier — the placeholder a
/// participant registers on-chain before the real cast exists. Anything
/// without this prefix is a real cast hash.
pub const TEMP_CAST_PREFIX: &str = "temp-";

/// Engagement weights. Shared with the on-chain payout validation.
pub const LIKE_WEIGHT: i64 = 1;
pub const RECAST_WEIGHT: i64 = 2;
pub const REPLY_WEIGHT: i64 = 3;

pub fn is_temp_cast_hash(id: &str) -> bool {
    id.starts_with(TEMP_CAST_PREFIX)
}

/// Round lifecycle. Monotonic active → finalized → claimed; the only
/// regression is the explicit finalize-rollback compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "round_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Active,
    Finalized,
    Claimed,
}

/// A round row. One per UTC day, created lazily on first entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Round {
    /// Day-index since epoch: floor(unix_secs / 86400).
    pub id: i64,
    pub date: NaiveDate,
    /// Accumulated pot share of entry fees, in wei.
    pub pot_amount: BigDecimal,
    pub status: RoundStatus,
    pub winner_fid: Option<i64>,
    pub winner_cast_hash: Option<String>,
    pub winner_wallet_address: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One participant's paid submission within a round.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub round_id: i64,
    pub fid: i64,
    pub wallet_address: String,
    /// Current known content identifier. Starts as the temp placeholder,
    /// replaced once the cast is posted.
    pub cast_hash: String,
    /// Identifier as registered on the external ledger. May lag `cast_hash`
    /// until reconciliation lands.
    pub contract_cast_hash: String,
    pub dunk_text: String,
    pub payment_tx_hash: String,
    pub likes: i64,
    pub recasts: i64,
    pub replies: i64,
    pub engagement_score: i64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Whether the cast has been posted (identifier is no longer the temp
    /// placeholder) and can be polled for engagement.
    pub fn has_real_cast(&self) -> bool {
        !is_temp_cast_hash(&self.cast_hash)
    }

    pub fn counts(&self) -> EngagementCounts {
        EngagementCounts {
            likes: self.likes,
            recasts: self.recasts,
            replies: self.replies,
        }
    }
}

/// Append-only audit row recording one engagement observation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EngagementSnapshot {
    pub id: i64,
    pub entry_id: i64,
    pub likes: i64,
    pub recasts: i64,
    pub replies: i64,
    pub weighted_score: i64,
    pub created_at: DateTime<Utc>,
}

/// Raw engagement counts fetched from the content API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub likes: i64,
    pub recasts: i64,
    pub replies: i64,
}

impl EngagementCounts {
    /// likes + 2·recasts + 3·replies
    pub fn weighted_score(&self) -> i64 {
        self.likes * LIKE_WEIGHT + self.recasts * RECAST_WEIGHT + self.replies * REPLY_WEIGHT
    }
}

/// Winner fields written onto a round at finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub fid: i64,
    pub cast_hash: String,
    pub wallet_address: String,
}
