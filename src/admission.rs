//! Entry admission: payment verification → pot accrual → content posting →
//! identifier reconciliation.
//!
//! The ordering matters. The pot increment and entry insert form a small
//! saga: if the insert fails after the increment, the increment is
//! compensated. Once the payment is verified nothing refunds it — a failed
//! content post leaves the entry on its temp identifier and surfaces
//! [`EngineError::PostingFailed`] with the identifiers an operator needs.

use std::sync::Arc;
use std::time::Duration;

use sqlx::types::BigDecimal;
use tracing::{error, info, warn};

use crate::chain::ChainLedger;
use crate::error::{EngineError, Result};
use crate::models::Entry;
use crate::retry::retry_linear;
use crate::round_clock::{current_round_id, round_date};
use crate::social::ContentApi;
use crate::store::{NewEntry, Store};

/// Fallback fee split when `potShareBps()` is unreadable: 80% of the entry
/// fee accrues to the pot.
pub const DEFAULT_POT_SHARE_BPS: u32 = 8_000;

/// Rename reconciliation: 3 attempts, 1s/2s linear backoff.
const RECONCILE_ATTEMPTS: u32 = 3;
const RECONCILE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// Authenticated participant identity (resolved upstream).
    pub fid: i64,
    /// Cast the dunk replies to.
    pub parent_cast_hash: String,
    pub dunk_text: String,
    /// `enterGame` transaction the participant already submitted.
    pub payment_tx_hash: String,
}

#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub entry: Entry,
    pub posted_cast_hash: String,
    /// Whether the temp → real rename landed on-chain. When false,
    /// settlement's reconciliation pass is the fallback.
    pub reconciled: bool,
}

pub struct Admission<S, C, A> {
    store: Arc<S>,
    chain: Arc<C>,
    content: Arc<A>,
    /// Base URL embedded in posted casts, e.g. the round page.
    embed_base: Option<String>,
}

impl<S: Store, C: ChainLedger, A: ContentApi> Admission<S, C, A> {
    pub fn new(store: Arc<S>, chain: Arc<C>, content: Arc<A>, embed_base: Option<String>) -> Self {
        Self {
            store,
            chain,
            content,
            embed_base,
        }
    }

    pub async fn enter(&self, req: AdmissionRequest) -> Result<AdmissionOutcome> {
        validate(&req)?;
        let round_id = current_round_id();

        if self.store.entry_exists(round_id, req.fid).await? {
            return Err(EngineError::DuplicateEntry {
                round_id,
                fid: req.fid,
            });
        }

        let payment = self.chain.verify_entry_payment(&req.payment_tx_hash).await?;

        let fee = self.chain.entry_fee().await?;
        let bps = match self.chain.pot_share_bps().await {
            Ok(bps) => bps,
            Err(e) => {
                warn!(
                    "pot share unreadable, falling back to {} bps: {}",
                    DEFAULT_POT_SHARE_BPS, e
                );
                DEFAULT_POT_SHARE_BPS
            }
        };
        let contribution = BigDecimal::from(fee * bps as u128 / 10_000);

        self.store.ensure_round(round_id, round_date(round_id)).await?;
        self.store.increment_pot(round_id, &contribution).await?;

        let entry = match self
            .store
            .insert_entry(NewEntry {
                round_id,
                fid: req.fid,
                wallet_address: payment.payer_wallet.clone(),
                temp_cast_hash: payment.temp_cast_hash.clone(),
                dunk_text: req.dunk_text.clone(),
                payment_tx_hash: req.payment_tx_hash.clone(),
            })
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                // Compensate the pot bump before failing the request.
                if let Err(comp) = self.store.decrement_pot(round_id, &contribution).await {
                    error!(
                        "pot compensation failed for round {} fid {} tx {}: {}",
                        round_id, req.fid, req.payment_tx_hash, comp
                    );
                }
                return Err(e);
            }
        };

        info!(
            "entry {} admitted: round {} fid {} temp id {}",
            entry.id, round_id, req.fid, payment.temp_cast_hash
        );

        // Payment is irreversible from here on. A posting failure is not
        // rolled back; it is reported with identifiers for manual follow-up.
        let embed = self
            .embed_base
            .as_ref()
            .map(|base| format!("{base}/round/{round_id}"));
        let posted = self
            .content
            .post_reply(&req.dunk_text, &req.parent_cast_hash, embed.as_deref())
            .await
            .map_err(|e| EngineError::PostingFailed {
                entry_id: entry.id,
                temp_cast_hash: payment.temp_cast_hash.clone(),
                reason: e.to_string(),
            })?;

        self.store.set_cast_hash(entry.id, &posted).await?;

        let reconciled = match retry_linear(
            RECONCILE_ATTEMPTS,
            RECONCILE_BACKOFF,
            "updateCastHash",
            || self.chain.update_cast_hash(&payment.temp_cast_hash, &posted),
        )
        .await
        {
            Ok(tx) => {
                self.store.set_contract_cast_hash(entry.id, &posted).await?;
                info!("entry {} reconciled on-chain (tx {})", entry.id, tx);
                true
            }
            Err(e) => {
                // Settlement's reconciliation pass picks this up.
                warn!(
                    "entry {} left unreconciled (temp {} -> {}): {}",
                    entry.id, payment.temp_cast_hash, posted, e
                );
                false
            }
        };

        let mut entry = entry;
        entry.cast_hash = posted.clone();
        if reconciled {
            entry.contract_cast_hash = posted.clone();
        }

        Ok(AdmissionOutcome {
            entry,
            posted_cast_hash: posted,
            reconciled,
        })
    }
}

fn validate(req: &AdmissionRequest) -> Result<()> {
    if req.fid <= 0 {
        return Err(EngineError::Validation(format!("bad fid {}", req.fid)));
    }
    if req.dunk_text.trim().is_empty() {
        return Err(EngineError::Validation("empty dunk text".into()));
    }
    if req.parent_cast_hash.trim().is_empty() {
        return Err(EngineError::Validation("missing parent cast hash".into()));
    }
    let tx = req.payment_tx_hash.strip_prefix("0x").unwrap_or_default();
    if hex::decode(tx).map(|b| b.len() != 32).unwrap_or(true) {
        return Err(EngineError::Validation(format!(
            "malformed payment tx hash {:?}",
            req.payment_tx_hash
        )));
    }
    Ok(())
}
