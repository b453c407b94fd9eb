//! In-memory doubles for the store, ledger, and content API seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::BigDecimal;

use dunkpot::chain::{ChainLedger, OnChainRoundInfo, VerifiedClaim, VerifiedPayment};
use dunkpot::error::{EngineError, Result};
use dunkpot::models::{EngagementCounts, EngagementSnapshot, Entry, Round, RoundStatus, Winner};
use dunkpot::social::ContentApi;
use dunkpot::store::{NewEntry, Store};

// =============================================================================
// MemStore
// =============================================================================

#[derive(Default)]
struct MemState {
    rounds: HashMap<i64, Round>,
    entries: Vec<Entry>,
    snapshots: Vec<EngagementSnapshot>,
    next_entry_id: i64,
    next_snapshot_id: i64,
}

/// In-memory [`Store`] mirroring the Postgres semantics: the unique
/// `(round_id, fid)` constraint, the status-guarded transitions, and the
/// append-only snapshot table.
pub struct MemStore {
    state: Mutex<MemState>,
    /// When set, `insert_entry` fails once (simulating a storage failure
    /// after the pot increment).
    pub fail_next_insert: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemState {
                next_entry_id: 1,
                next_snapshot_id: 1,
                ..Default::default()
            }),
            fail_next_insert: AtomicBool::new(false),
        }
    }

    pub fn seed_round(&self, id: i64, status: RoundStatus, winner: Option<Winner>) {
        let mut st = self.state.lock().unwrap();
        st.rounds.insert(
            id,
            Round {
                id,
                date: dunkpot::round_date(id),
                pot_amount: BigDecimal::from(0),
                status,
                winner_fid: winner.as_ref().map(|w| w.fid),
                winner_cast_hash: winner.as_ref().map(|w| w.cast_hash.clone()),
                winner_wallet_address: winner.as_ref().map(|w| w.wallet_address.clone()),
                finalized_at: (status != RoundStatus::Active).then(Utc::now),
                claimed_at: (status == RoundStatus::Claimed).then(Utc::now),
                created_at: Utc::now(),
            },
        );
    }

    /// Insert an entry row directly, bypassing admission.
    pub fn seed_entry(
        &self,
        round_id: i64,
        fid: i64,
        cast_hash: &str,
        contract_cast_hash: &str,
        score: i64,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let mut st = self.state.lock().unwrap();
        let id = st.next_entry_id;
        st.next_entry_id += 1;
        st.entries.push(Entry {
            id,
            round_id,
            fid,
            wallet_address: format!("0x{:040x}", fid),
            cast_hash: cast_hash.to_string(),
            contract_cast_hash: contract_cast_hash.to_string(),
            dunk_text: format!("dunk from {fid}"),
            payment_tx_hash: format!("0x{:064x}", fid),
            likes: score,
            recasts: 0,
            replies: 0,
            engagement_score: score,
            created_at,
        });
        id
    }

    pub fn round_row(&self, id: i64) -> Option<Round> {
        self.state.lock().unwrap().rounds.get(&id).cloned()
    }

    pub fn entry_row(&self, id: i64) -> Option<Entry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn pot(&self, round_id: i64) -> BigDecimal {
        self.round_row(round_id)
            .map(|r| r.pot_amount)
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    pub fn snapshots_for(&self, entry_id: i64) -> Vec<EngagementSnapshot> {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .filter(|s| s.entry_id == entry_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn ensure_round(&self, round_id: i64, date: NaiveDate) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.rounds.entry(round_id).or_insert_with(|| Round {
            id: round_id,
            date,
            pot_amount: BigDecimal::from(0),
            status: RoundStatus::Active,
            winner_fid: None,
            winner_cast_hash: None,
            winner_wallet_address: None,
            finalized_at: None,
            claimed_at: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn increment_pot(&self, round_id: i64, amount_wei: &BigDecimal) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if let Some(round) = st.rounds.get_mut(&round_id) {
            round.pot_amount = &round.pot_amount + amount_wei;
        }
        Ok(())
    }

    async fn decrement_pot(&self, round_id: i64, amount_wei: &BigDecimal) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if let Some(round) = st.rounds.get_mut(&round_id) {
            round.pot_amount = &round.pot_amount - amount_wei;
        }
        Ok(())
    }

    async fn entry_exists(&self, round_id: i64, fid: i64) -> Result<bool> {
        let st = self.state.lock().unwrap();
        Ok(st
            .entries
            .iter()
            .any(|e| e.round_id == round_id && e.fid == fid))
    }

    async fn insert_entry(&self, new: NewEntry) -> Result<Entry> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Store(sqlx::Error::RowNotFound));
        }
        let mut st = self.state.lock().unwrap();
        if st
            .entries
            .iter()
            .any(|e| e.round_id == new.round_id && e.fid == new.fid)
        {
            return Err(EngineError::DuplicateEntry {
                round_id: new.round_id,
                fid: new.fid,
            });
        }
        let id = st.next_entry_id;
        st.next_entry_id += 1;
        let entry = Entry {
            id,
            round_id: new.round_id,
            fid: new.fid,
            wallet_address: new.wallet_address,
            cast_hash: new.temp_cast_hash.clone(),
            contract_cast_hash: new.temp_cast_hash,
            dunk_text: new.dunk_text,
            payment_tx_hash: new.payment_tx_hash,
            likes: 0,
            recasts: 0,
            replies: 0,
            engagement_score: 0,
            created_at: Utc::now(),
        };
        st.entries.push(entry.clone());
        Ok(entry)
    }

    async fn set_cast_hash(&self, entry_id: i64, cast_hash: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if let Some(entry) = st.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.cast_hash = cast_hash.to_string();
        }
        Ok(())
    }

    async fn set_contract_cast_hash(&self, entry_id: i64, cast_hash: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if let Some(entry) = st.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.contract_cast_hash = cast_hash.to_string();
        }
        Ok(())
    }

    async fn round(&self, round_id: i64) -> Result<Option<Round>> {
        Ok(self.round_row(round_id))
    }

    async fn entries_ranked(&self, round_id: i64) -> Result<Vec<Entry>> {
        let st = self.state.lock().unwrap();
        let mut entries: Vec<Entry> = st
            .entries
            .iter()
            .filter(|e| e.round_id == round_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.engagement_score
                .cmp(&a.engagement_score)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(entries)
    }

    async fn pollable_entries(&self, round_ids: &[i64]) -> Result<Vec<Entry>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .entries
            .iter()
            .filter(|e| {
                round_ids.contains(&e.round_id)
                    && e.has_real_cast()
                    && st
                        .rounds
                        .get(&e.round_id)
                        .is_some_and(|r| r.status == RoundStatus::Active)
            })
            .cloned()
            .collect())
    }

    async fn entry_by_contract_cast_hash(
        &self,
        round_id: i64,
        cast_hash: &str,
    ) -> Result<Option<Entry>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .entries
            .iter()
            .find(|e| e.round_id == round_id && e.contract_cast_hash == cast_hash)
            .cloned())
    }

    async fn record_engagement(
        &self,
        entry_id: i64,
        counts: EngagementCounts,
        weighted_score: i64,
    ) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if let Some(entry) = st.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.likes = counts.likes;
            entry.recasts = counts.recasts;
            entry.replies = counts.replies;
            entry.engagement_score = weighted_score;
        }
        let id = st.next_snapshot_id;
        st.next_snapshot_id += 1;
        st.snapshots.push(EngagementSnapshot {
            id,
            entry_id,
            likes: counts.likes,
            recasts: counts.recasts,
            replies: counts.replies,
            weighted_score,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn mark_finalized(
        &self,
        round_id: i64,
        winner: Option<&Winner>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let round = st.rounds.get_mut(&round_id).filter(|r| r.status == RoundStatus::Active);
        match round {
            Some(round) => {
                round.status = RoundStatus::Finalized;
                round.finalized_at = Some(at);
                round.winner_fid = winner.map(|w| w.fid);
                round.winner_cast_hash = winner.map(|w| w.cast_hash.clone());
                round.winner_wallet_address = winner.map(|w| w.wallet_address.clone());
                Ok(())
            }
            None => Err(EngineError::Consistency {
                round_id,
                detail: "finalize commit found round not active".into(),
            }),
        }
    }

    async fn rollback_finalized(&self, round_id: i64) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let round = st
            .rounds
            .get_mut(&round_id)
            .filter(|r| r.status == RoundStatus::Finalized);
        match round {
            Some(round) => {
                round.status = RoundStatus::Active;
                round.finalized_at = None;
                round.winner_fid = None;
                round.winner_cast_hash = None;
                round.winner_wallet_address = None;
                Ok(())
            }
            None => Err(EngineError::Consistency {
                round_id,
                detail: "rollback found round not finalized".into(),
            }),
        }
    }

    async fn mark_claimed(&self, round_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let round = st
            .rounds
            .get_mut(&round_id)
            .filter(|r| r.status == RoundStatus::Finalized);
        match round {
            Some(round) => {
                round.status = RoundStatus::Claimed;
                round.claimed_at = Some(at);
                Ok(())
            }
            None => Err(EngineError::Consistency {
                round_id,
                detail: "claim found round not finalized".into(),
            }),
        }
    }
}

// =============================================================================
// MockLedger
// =============================================================================

pub const CONTRACT_ADDRESS: &str = "0x00000000000000000000000000000000c0ffee00";

#[derive(Default)]
struct LedgerState {
    payments: HashMap<String, VerifiedPayment>,
    claims: HashMap<String, VerifiedClaim>,
    /// Per-round registry of identifiers, mutated by successful renames.
    registry: HashMap<i64, Vec<String>>,
    round_infos: HashMap<i64, OnChainRoundInfo>,
    rename_calls: Vec<(String, String)>,
    finalize_calls: Vec<FinalizeCall>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeCall {
    pub round_id: i64,
    pub cast_hashes: Vec<String>,
    pub likes: Vec<u64>,
    pub recasts: Vec<u64>,
    pub replies: Vec<u64>,
}

pub struct MockLedger {
    state: Mutex<LedgerState>,
    pub entry_fee_wei: AtomicU64,
    /// None simulates an unreadable potShareBps view.
    pub pot_share: Mutex<Option<u32>>,
    /// Number of rename calls that fail before one succeeds.
    pub rename_failures: AtomicU64,
    pub fail_finalize: AtomicBool,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            entry_fee_wei: AtomicU64::new(1_000_000_000_000_000), // 0.001 ether
            pot_share: Mutex::new(Some(8_000)),
            rename_failures: AtomicU64::new(0),
            fail_finalize: AtomicBool::new(false),
        }
    }

    pub fn add_payment(&self, tx_hash: &str, payment: VerifiedPayment) {
        self.state
            .lock()
            .unwrap()
            .payments
            .insert(tx_hash.to_string(), payment);
    }

    pub fn add_claim(&self, tx_hash: &str, claim: VerifiedClaim) {
        self.state
            .lock()
            .unwrap()
            .claims
            .insert(tx_hash.to_string(), claim);
    }

    pub fn register(&self, round_id: i64, cast_hash: &str) {
        self.state
            .lock()
            .unwrap()
            .registry
            .entry(round_id)
            .or_default()
            .push(cast_hash.to_string());
    }

    pub fn set_round_info(&self, round_id: i64, info: OnChainRoundInfo) {
        self.state.lock().unwrap().round_infos.insert(round_id, info);
    }

    pub fn rename_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().rename_calls.clone()
    }

    pub fn finalize_calls(&self) -> Vec<FinalizeCall> {
        self.state.lock().unwrap().finalize_calls.clone()
    }
}

#[async_trait]
impl ChainLedger for MockLedger {
    async fn verify_entry_payment(&self, tx_hash: &str) -> Result<VerifiedPayment> {
        self.state
            .lock()
            .unwrap()
            .payments
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| {
                EngineError::ChainVerification(format!("payment tx {tx_hash} not found"))
            })
    }

    async fn entry_fee(&self) -> Result<u128> {
        Ok(self.entry_fee_wei.load(Ordering::SeqCst) as u128)
    }

    async fn pot_share_bps(&self) -> Result<u32> {
        self.pot_share
            .lock()
            .unwrap()
            .ok_or_else(|| EngineError::Chain("potShareBps unreadable".into()))
    }

    async fn update_cast_hash(&self, old: &str, new: &str) -> Result<String> {
        let mut st = self.state.lock().unwrap();
        st.rename_calls.push((old.to_string(), new.to_string()));
        if self
            .rename_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Chain("rename rpc down".into()));
        }
        for ids in st.registry.values_mut() {
            for id in ids.iter_mut() {
                if id == old {
                    *id = new.to_string();
                }
            }
        }
        Ok(format!("0xrename{}", st.rename_calls.len()))
    }

    async fn round_cast_hashes(&self, round_id: i64) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .registry
            .get(&round_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn finalize_round(
        &self,
        round_id: i64,
        cast_hashes: &[String],
        likes: &[u64],
        recasts: &[u64],
        replies: &[u64],
    ) -> Result<String> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(EngineError::Chain("finalize rpc down".into()));
        }
        let mut st = self.state.lock().unwrap();
        st.finalize_calls.push(FinalizeCall {
            round_id,
            cast_hashes: cast_hashes.to_vec(),
            likes: likes.to_vec(),
            recasts: recasts.to_vec(),
            replies: replies.to_vec(),
        });
        Ok(format!("0xfinalize{round_id}"))
    }

    async fn round_info(&self, round_id: i64) -> Result<OnChainRoundInfo> {
        self.state
            .lock()
            .unwrap()
            .round_infos
            .get(&round_id)
            .cloned()
            .ok_or_else(|| EngineError::Chain("getRoundInfo unreadable".into()))
    }

    async fn verify_claim_tx(&self, tx_hash: &str) -> Result<VerifiedClaim> {
        self.state
            .lock()
            .unwrap()
            .claims
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| EngineError::ChainVerification(format!("claim tx {tx_hash} not found")))
    }

    fn contract_address(&self) -> String {
        CONTRACT_ADDRESS.to_string()
    }
}

// =============================================================================
// MockContentApi
// =============================================================================

#[derive(Default)]
struct ContentState {
    engagement: HashMap<String, EngagementCounts>,
    posts: Vec<(String, String)>,
}

pub struct MockContentApi {
    state: Mutex<ContentState>,
    pub fetch_calls: AtomicU64,
    pub fail_posts: AtomicBool,
}

impl MockContentApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContentState::default()),
            fetch_calls: AtomicU64::new(0),
            fail_posts: AtomicBool::new(false),
        }
    }

    pub fn set_engagement(&self, cast_hash: &str, counts: EngagementCounts) {
        self.state
            .lock()
            .unwrap()
            .engagement
            .insert(cast_hash.to_string(), counts);
    }

    pub fn posts(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().posts.clone()
    }
}

#[async_trait]
impl ContentApi for MockContentApi {
    async fn fetch_engagement(&self, cast_hash: &str) -> Result<EngagementCounts> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .engagement
            .get(cast_hash)
            .copied()
            .ok_or_else(|| EngineError::ExternalService(format!("cast {cast_hash} not found")))
    }

    async fn post_reply(
        &self,
        text: &str,
        parent_cast_hash: &str,
        _embed_url: Option<&str>,
    ) -> Result<String> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(EngineError::ExternalService("publish failed: http 500".into()));
        }
        let mut st = self.state.lock().unwrap();
        st.posts.push((parent_cast_hash.to_string(), text.to_string()));
        Ok(format!("0xposted{:02x}", st.posts.len()))
    }
}
