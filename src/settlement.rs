//! Round settlement: rank, commit off-chain, finalize on-chain, or roll
//! back.
//!
//! One settlement run drives a round through an explicit state machine:
//!
//! ```text
//! Active → PendingFinalize → Finalized
//!                          ↘ Active (rolled back)
//! ```
//!
//! The off-chain commit always precedes the chain finalize call, and the
//! compensating rollback restores the exact prior round snapshot (status
//! active, winner fields cleared) on any chain failure. An off-chain
//! `finalized` must never be observably true while the chain disagrees.
//!
//! No distributed lock enforces a single runner; the guarded
//! `mark_finalized ... WHERE status = 'active'` makes a racing second run
//! fail its commit, and residual double-finalize risk rests on the
//! contract's own idempotency.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::chain::ChainLedger;
use crate::error::{EngineError, Result};
use crate::models::{is_temp_cast_hash, RoundStatus, Winner};
use crate::retry::retry_linear;
use crate::round_clock::current_round_id;
use crate::store::Store;

const RECONCILE_ATTEMPTS: u32 = 3;
const RECONCILE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Round row never existed — nobody entered.
    NothingToFinalize,
    /// Round already finalized or claimed; idempotent no-op.
    AlreadyFinalized,
    /// Round had no entries: finalized off-chain, no chain call issued.
    FinalizedEmpty,
    /// Winner committed off-chain and confirmed on-chain.
    Finalized {
        winner: Winner,
        finalize_tx: String,
    },
}

pub struct Settlement<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
}

impl<S: Store, C: ChainLedger> Settlement<S, C> {
    pub fn new(store: Arc<S>, chain: Arc<C>) -> Self {
        Self { store, chain }
    }

    /// Settle the just-ended round. Scheduled once per round boundary.
    pub async fn settle_previous(&self) -> Result<SettlementOutcome> {
        self.settle(current_round_id() - 1).await
    }

    pub async fn settle(&self, round_id: i64) -> Result<SettlementOutcome> {
        let round = match self.store.round(round_id).await? {
            None => {
                info!("round {}: nothing to finalize", round_id);
                return Ok(SettlementOutcome::NothingToFinalize);
            }
            Some(round) => round,
        };
        if round.status != RoundStatus::Active {
            info!("round {}: already {:?}", round_id, round.status);
            return Ok(SettlementOutcome::AlreadyFinalized);
        }

        // Ranking must match the on-chain tie-break rule: score descending,
        // earliest entry wins ties.
        let entries = self.store.entries_ranked(round_id).await?;
        let now = Utc::now();

        if entries.is_empty() {
            self.store.mark_finalized(round_id, None, now).await?;
            info!("round {}: finalized empty", round_id);
            return Ok(SettlementOutcome::FinalizedEmpty);
        }

        let top = &entries[0];
        let winner = Winner {
            fid: top.fid,
            cast_hash: top.cast_hash.clone(),
            wallet_address: top.wallet_address.clone(),
        };

        // Optimistic off-chain commit. PendingFinalize from here until the
        // chain confirms or the rollback lands.
        self.store.mark_finalized(round_id, Some(&winner), now).await?;
        info!(
            "round {}: committed winner fid {} (score {}), finalizing on-chain",
            round_id, winner.fid, top.engagement_score
        );

        match self.finalize_on_chain(round_id).await {
            Ok(finalize_tx) => {
                info!("round {}: finalized on-chain (tx {})", round_id, finalize_tx);
                Ok(SettlementOutcome::Finalized {
                    winner,
                    finalize_tx,
                })
            }
            Err(e) => {
                if let Err(rb) = self.store.rollback_finalized(round_id).await {
                    // Both ledgers now disagree and the row is stuck; this
                    // needs a human immediately.
                    error!(
                        "round {}: ROLLBACK FAILED after chain failure ({}): {}",
                        round_id, e, rb
                    );
                } else {
                    warn!("round {}: rolled back to active after chain failure", round_id);
                }
                Err(EngineError::Consistency {
                    round_id,
                    detail: format!("chain finalize failed: {e}"),
                })
            }
        }
    }

    /// Reconcile leftover temp identifiers, build the engagement arrays
    /// aligned to the ledger's registry, and submit the finalize
    /// transaction.
    async fn finalize_on_chain(&self, round_id: i64) -> Result<String> {
        let registered = self.chain.round_cast_hashes(round_id).await?;

        for temp_id in registered.iter().filter(|id| is_temp_cast_hash(id)) {
            let entry = match self
                .store
                .entry_by_contract_cast_hash(round_id, temp_id)
                .await?
            {
                Some(entry) => entry,
                None => {
                    warn!(
                        "round {}: registered identifier {} matches no entry",
                        round_id, temp_id
                    );
                    continue;
                }
            };
            if entry.cast_hash == *temp_id {
                // Cast was never posted; nothing to rename.
                continue;
            }
            match retry_linear(RECONCILE_ATTEMPTS, RECONCILE_BACKOFF, "updateCastHash", || {
                self.chain.update_cast_hash(temp_id, &entry.cast_hash)
            })
            .await
            {
                Ok(_) => {
                    self.store
                        .set_contract_cast_hash(entry.id, &entry.cast_hash)
                        .await?;
                }
                Err(e) => warn!(
                    "round {}: identifier {} left unreconciled: {}",
                    round_id, temp_id, e
                ),
            }
        }

        // Re-read after reconciliation; the arrays must align 1:1 with the
        // ledger's identifier list.
        let ids = self.chain.round_cast_hashes(round_id).await?;
        let mut likes = Vec::with_capacity(ids.len());
        let mut recasts = Vec::with_capacity(ids.len());
        let mut replies = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.store.entry_by_contract_cast_hash(round_id, id).await? {
                Some(entry) => {
                    likes.push(entry.likes.max(0) as u64);
                    recasts.push(entry.recasts.max(0) as u64);
                    replies.push(entry.replies.max(0) as u64);
                }
                None => {
                    warn!(
                        "round {}: no entry for registered identifier {}, using zero counts",
                        round_id, id
                    );
                    likes.push(0);
                    recasts.push(0);
                    replies.push(0);
                }
            }
        }

        self.chain
            .finalize_round(round_id, &ids, &likes, &recasts, &replies)
            .await
    }
}
