//! Engine error taxonomy
//!
//! Money-affecting failures carry full correlation context (round id, fid,
//! entry id, identifiers, tx hash) so an operator can reconcile the two
//! ledgers by hand.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed identifier or amount. Rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// One entry per participant per round.
    #[error("fid {fid} already entered round {round_id}")]
    DuplicateEntry { round_id: i64, fid: i64 },

    /// Payment or claim transaction did not check out on-chain.
    /// Not auto-retried.
    #[error("chain verification failed: {0}")]
    ChainVerification(String),

    /// Payment landed on-chain but the content post failed. The payment is
    /// irreversible, so this is surfaced distinctly for manual follow-up
    /// rather than rolled back.
    #[error(
        "payment confirmed but content posting failed (entry {entry_id}, temp id {temp_cast_hash}): {reason}"
    )]
    PostingFailed {
        entry_id: i64,
        temp_cast_hash: String,
        reason: String,
    },

    /// External content API failure outside the paid-guarantee path.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The chain finalize call failed after the optimistic off-chain commit.
    /// The round has been rolled back to active; an operator must reconcile.
    #[error("consistency: round {round_id} rolled back after chain failure: {detail}")]
    Consistency { round_id: i64, detail: String },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Chain RPC transport/submission failure.
    #[error("chain rpc error: {0}")]
    Chain(String),
}

impl EngineError {
    pub fn chain<E: std::fmt::Display>(e: E) -> Self {
        Self::Chain(e.to_string())
    }

    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Self::ExternalService(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
