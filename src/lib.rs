pub mod admission;
pub mod chain;
pub mod claim;
pub mod collector;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod round_clock;
pub mod settlement;
pub mod social;
pub mod store;

pub use admission::{Admission, AdmissionOutcome, AdmissionRequest, DEFAULT_POT_SHARE_BPS};
pub use chain::{ChainLedger, EvmLedger, OnChainRoundInfo, VerifiedClaim, VerifiedPayment};
pub use claim::{ClaimConfirmation, ClaimTicket, ClaimVerifier};
pub use collector::{Collector, CollectorRun};
pub use config::Config;
pub use error::{EngineError, Result};
pub use models::{
    EngagementCounts, EngagementSnapshot, Entry, Round, RoundStatus, Winner,
    is_temp_cast_hash, LIKE_WEIGHT, RECAST_WEIGHT, REPLY_WEIGHT, TEMP_CAST_PREFIX,
};
pub use retry::retry_linear;
pub use round_clock::{
    current_round_id, round_date, round_end, round_id_at, round_start, ROUND_DURATION_SECS,
};
pub use settlement::{Settlement, SettlementOutcome};
pub use social::{ContentApi, FarcasterClient};
pub use store::{NewEntry, PgStore, Store};
