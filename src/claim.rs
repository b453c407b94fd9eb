//! Reward claim verification, two phases.
//!
//! Custody never moves through this crate: phase 1 hands the winner the
//! contract call parameters, the winner signs and submits the claim with
//! their own key, and phase 2 verifies the landed transaction before
//! recording the round as claimed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::chain::ChainLedger;
use crate::error::{EngineError, Result};
use crate::models::{Round, RoundStatus};
use crate::store::Store;

/// Parameters the winner needs to submit the claim transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimTicket {
    pub contract_address: String,
    pub function: &'static str,
    pub round_id: i64,
}

#[derive(Debug, Clone)]
pub struct ClaimConfirmation {
    pub round_id: i64,
    pub claim_tx_hash: String,
    pub claimed_at: DateTime<Utc>,
}

pub struct ClaimVerifier<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
}

impl<S: Store, C: ChainLedger> ClaimVerifier<S, C> {
    pub fn new(store: Arc<S>, chain: Arc<C>) -> Self {
        Self { store, chain }
    }

    /// Phase 1: check eligibility and return the call parameters.
    pub async fn eligibility(&self, round_id: i64, caller_fid: i64) -> Result<ClaimTicket> {
        self.require_claimable(round_id, caller_fid).await?;

        // Sanity-check the chain's view; an explicit disagreement means the
        // projection is broken and paying out would be wrong.
        match self.chain.round_info(round_id).await {
            Ok(info) if !info.finalized => {
                return Err(EngineError::Consistency {
                    round_id,
                    detail: "round finalized off-chain but not on-chain".into(),
                });
            }
            Ok(_) => {}
            Err(e) => warn!("round {}: getRoundInfo unavailable: {}", round_id, e),
        }

        Ok(ClaimTicket {
            contract_address: self.chain.contract_address(),
            function: "claimDailyReward",
            round_id,
        })
    }

    /// Phase 2: verify the submitted claim transaction and record the round
    /// as claimed.
    pub async fn confirm(
        &self,
        round_id: i64,
        caller_fid: i64,
        claim_tx_hash: &str,
    ) -> Result<ClaimConfirmation> {
        let round = self.require_claimable(round_id, caller_fid).await?;

        let verified = self.chain.verify_claim_tx(claim_tx_hash).await?;
        if verified.round_id != round_id {
            return Err(EngineError::ChainVerification(format!(
                "claim tx {} targets round {}, expected {}",
                claim_tx_hash, verified.round_id, round_id
            )));
        }
        if let Some(winner_wallet) = &round.winner_wallet_address {
            if !verified.claimer_wallet.eq_ignore_ascii_case(winner_wallet) {
                return Err(EngineError::ChainVerification(format!(
                    "claim tx {} signed by {}, winner wallet is {}",
                    claim_tx_hash, verified.claimer_wallet, winner_wallet
                )));
            }
        }

        let claimed_at = Utc::now();
        self.store.mark_claimed(round_id, claimed_at).await?;
        info!(
            "round {}: claimed by fid {} (tx {})",
            round_id, caller_fid, claim_tx_hash
        );

        Ok(ClaimConfirmation {
            round_id,
            claim_tx_hash: claim_tx_hash.to_string(),
            claimed_at,
        })
    }

    /// Shared eligibility gate: round exists, is exactly finalized, and the
    /// caller is its winner.
    async fn require_claimable(&self, round_id: i64, caller_fid: i64) -> Result<Round> {
        let round = self
            .store
            .round(round_id)
            .await?
            .ok_or_else(|| EngineError::Validation(format!("round {round_id} not found")))?;

        match round.status {
            RoundStatus::Active => {
                return Err(EngineError::Validation(format!(
                    "round {round_id} is not finalized"
                )));
            }
            RoundStatus::Claimed => {
                return Err(EngineError::Validation(format!(
                    "round {round_id} already claimed"
                )));
            }
            RoundStatus::Finalized => {}
        }

        if round.winner_fid != Some(caller_fid) {
            return Err(EngineError::Validation(format!(
                "fid {caller_fid} is not the winner of round {round_id}"
            )));
        }

        Ok(round)
    }
}
