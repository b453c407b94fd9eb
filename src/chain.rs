//! External ledger seam and the EVM implementation.
//!
//! The contract interface is fixed (see `DunkGame` below); this crate never
//! implements payout logic, it only verifies payments, reconciles
//! identifiers, and submits the finalize transaction with the engagement
//! arrays the contract validates independently. All writes block on receipt
//! confirmation before the caller proceeds.
//!
//! Trait-level types are plain strings/integers so test doubles need no
//! alloy machinery.

use alloy::consensus::Transaction as _;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::models::is_temp_cast_hash;
use crate::retry::retry_linear;

/// How long to wait for a claim transaction to be mined before treating it
/// as absent. Winners submit the claim themselves, so the serving layer
/// often calls in while the transaction is still pending.
const RECEIPT_WAIT_ATTEMPTS: u32 = 5;
const RECEIPT_WAIT_BACKOFF: Duration = Duration::from_secs(2);

sol! {
    #[sol(rpc)]
    contract DunkGame {
        function entryFee() external view returns (uint256);
        function potShareBps() external view returns (uint256);
        function enterGame(string tempCastHash) external payable;
        function updateCastHash(string oldCastHash, string newCastHash) external;
        function getRoundCastHashes(uint256 roundId) external view returns (string[] memory);
        function finalizeRound(
            uint256 roundId,
            string[] castHashes,
            uint256[] likes,
            uint256[] recasts,
            uint256[] replies
        ) external;
        function getRoundInfo(uint256 roundId)
            external
            view
            returns (
                uint256 startTime,
                uint256 endTime,
                uint256 pot,
                address winner,
                bool finalized,
                uint256 entryCount
            );
        function claimDailyReward(uint256 roundId) external;
    }
}

/// A confirmed `enterGame` payment, decoded from chain state.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub temp_cast_hash: String,
    pub payer_wallet: String,
    pub amount_wei: u128,
}

/// A confirmed `claimDailyReward` transaction.
#[derive(Debug, Clone)]
pub struct VerifiedClaim {
    pub claimer_wallet: String,
    pub round_id: i64,
}

/// `getRoundInfo` view result.
#[derive(Debug, Clone)]
pub struct OnChainRoundInfo {
    pub start_time: u64,
    pub end_time: u64,
    pub pot_wei: u128,
    pub winner_wallet: String,
    pub finalized: bool,
    pub entry_count: u64,
}

#[async_trait]
pub trait ChainLedger: Send + Sync {
    /// Verify an entry payment: transaction exists, succeeded, was sent to
    /// the game contract, and carries an `enterGame` call with a well-formed
    /// temporary identifier.
    async fn verify_entry_payment(&self, tx_hash: &str) -> Result<VerifiedPayment>;

    /// Current entry fee in wei.
    async fn entry_fee(&self) -> Result<u128>;

    /// Share of the fee that accrues to the pot, in basis points.
    async fn pot_share_bps(&self) -> Result<u32>;

    /// Rename a registered identifier. Blocks on confirmation; returns the
    /// transaction hash.
    async fn update_cast_hash(&self, old: &str, new: &str) -> Result<String>;

    /// Identifiers the ledger has registered for a round.
    async fn round_cast_hashes(&self, round_id: i64) -> Result<Vec<String>>;

    /// Submit the finalize transaction with parallel engagement arrays and
    /// wait for confirmation. Returns the transaction hash.
    async fn finalize_round(
        &self,
        round_id: i64,
        cast_hashes: &[String],
        likes: &[u64],
        recasts: &[u64],
        replies: &[u64],
    ) -> Result<String>;

    async fn round_info(&self, round_id: i64) -> Result<OnChainRoundInfo>;

    /// Verify a winner-signed claim transaction: wait a bounded time for it
    /// to be mined, check it succeeded and was sent to the game contract,
    /// and decode the claimed round id.
    async fn verify_claim_tx(&self, tx_hash: &str) -> Result<VerifiedClaim>;

    /// Contract address, for claim tickets.
    fn contract_address(&self) -> String;
}

/// Alloy-backed ledger client. One signing key submits all server-side
/// writes (renames, finalize); claims are signed by winners, never here.
pub struct EvmLedger {
    provider: DynProvider,
    address: Address,
}

impl EvmLedger {
    pub fn new(rpc_url: &str, contract_address: &str, signer_key: &str) -> Result<Self> {
        let address: Address = contract_address
            .parse()
            .map_err(|_| EngineError::Validation(format!("bad contract address {contract_address}")))?;
        let signer: PrivateKeySigner = signer_key
            .parse()
            .map_err(|_| EngineError::Validation("bad operator signing key".into()))?;
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|_| EngineError::Validation(format!("bad rpc url {rpc_url}")))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        Ok(Self { provider, address })
    }

    fn contract(&self) -> DunkGame::DunkGameInstance<DynProvider> {
        DunkGame::new(self.address, self.provider.clone())
    }

    fn parse_hash(tx_hash: &str) -> Result<B256> {
        tx_hash
            .parse()
            .map_err(|_| EngineError::Validation(format!("bad transaction hash {tx_hash}")))
    }

    fn wallet_string(addr: Address) -> String {
        format!("{addr:#x}")
    }

    async fn receipt_once(
        &self,
        hash: B256,
        tx_hash: &str,
    ) -> Result<alloy::rpc::types::TransactionReceipt> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(EngineError::chain)?
            .ok_or_else(|| EngineError::ChainVerification(format!("claim tx {tx_hash} not found")))
    }
}

#[async_trait]
impl ChainLedger for EvmLedger {
    async fn verify_entry_payment(&self, tx_hash: &str) -> Result<VerifiedPayment> {
        let hash = Self::parse_hash(tx_hash)?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(EngineError::chain)?
            .ok_or_else(|| {
                EngineError::ChainVerification(format!("payment tx {tx_hash} not found"))
            })?;
        if !receipt.status() {
            return Err(EngineError::ChainVerification(format!(
                "payment tx {tx_hash} reverted"
            )));
        }
        if receipt.to != Some(self.address) {
            return Err(EngineError::ChainVerification(format!(
                "payment tx {tx_hash} was not sent to the game contract"
            )));
        }

        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(EngineError::chain)?
            .ok_or_else(|| {
                EngineError::ChainVerification(format!("payment tx {tx_hash} body not found"))
            })?;

        let call = DunkGame::enterGameCall::abi_decode(tx.input().as_ref()).map_err(|e| {
            EngineError::ChainVerification(format!("payment tx {tx_hash} is not enterGame: {e}"))
        })?;
        if !is_temp_cast_hash(&call.tempCastHash) {
            return Err(EngineError::Validation(format!(
                "embedded identifier {:?} is not a temporary cast hash",
                call.tempCastHash
            )));
        }
        let amount_wei = u128::try_from(tx.value()).map_err(|_| {
            EngineError::ChainVerification(format!("payment tx {tx_hash} value out of range"))
        })?;

        Ok(VerifiedPayment {
            temp_cast_hash: call.tempCastHash,
            payer_wallet: Self::wallet_string(receipt.from),
            amount_wei,
        })
    }

    async fn entry_fee(&self) -> Result<u128> {
        let fee = self
            .contract()
            .entryFee()
            .call()
            .await
            .map_err(EngineError::chain)?;
        u128::try_from(fee).map_err(|_| EngineError::Chain("entry fee out of range".into()))
    }

    async fn pot_share_bps(&self) -> Result<u32> {
        let bps = self
            .contract()
            .potShareBps()
            .call()
            .await
            .map_err(EngineError::chain)?;
        u32::try_from(bps).map_err(|_| EngineError::Chain("pot share bps out of range".into()))
    }

    async fn update_cast_hash(&self, old: &str, new: &str) -> Result<String> {
        let pending = self
            .contract()
            .updateCastHash(old.to_string(), new.to_string())
            .send()
            .await
            .map_err(EngineError::chain)?;
        let receipt = pending.get_receipt().await.map_err(EngineError::chain)?;
        if !receipt.status() {
            return Err(EngineError::Chain(format!(
                "updateCastHash({old} -> {new}) reverted"
            )));
        }
        Ok(format!("{:#x}", receipt.transaction_hash))
    }

    async fn round_cast_hashes(&self, round_id: i64) -> Result<Vec<String>> {
        self.contract()
            .getRoundCastHashes(U256::from(round_id))
            .call()
            .await
            .map_err(EngineError::chain)
    }

    async fn finalize_round(
        &self,
        round_id: i64,
        cast_hashes: &[String],
        likes: &[u64],
        recasts: &[u64],
        replies: &[u64],
    ) -> Result<String> {
        let as_u256 = |xs: &[u64]| xs.iter().copied().map(U256::from).collect::<Vec<_>>();
        let pending = self
            .contract()
            .finalizeRound(
                U256::from(round_id),
                cast_hashes.to_vec(),
                as_u256(likes),
                as_u256(recasts),
                as_u256(replies),
            )
            .send()
            .await
            .map_err(EngineError::chain)?;
        let receipt = pending.get_receipt().await.map_err(EngineError::chain)?;
        if !receipt.status() {
            return Err(EngineError::Chain(format!(
                "finalizeRound({round_id}) reverted"
            )));
        }
        Ok(format!("{:#x}", receipt.transaction_hash))
    }

    async fn round_info(&self, round_id: i64) -> Result<OnChainRoundInfo> {
        let info = self
            .contract()
            .getRoundInfo(U256::from(round_id))
            .call()
            .await
            .map_err(EngineError::chain)?;
        let to_u64 = |v: U256, what: &str| {
            u64::try_from(v).map_err(|_| EngineError::Chain(format!("{what} out of range")))
        };
        Ok(OnChainRoundInfo {
            start_time: to_u64(info.startTime, "round start")?,
            end_time: to_u64(info.endTime, "round end")?,
            pot_wei: u128::try_from(info.pot)
                .map_err(|_| EngineError::Chain("round pot out of range".into()))?,
            winner_wallet: Self::wallet_string(info.winner),
            finalized: info.finalized,
            entry_count: to_u64(info.entryCount, "entry count")?,
        })
    }

    async fn verify_claim_tx(&self, tx_hash: &str) -> Result<VerifiedClaim> {
        let hash = Self::parse_hash(tx_hash)?;

        // The receipt only appears once the transaction is mined; poll for
        // it so a claim submitted moments ago is not rejected as missing.
        let receipt = retry_linear(
            RECEIPT_WAIT_ATTEMPTS,
            RECEIPT_WAIT_BACKOFF,
            "claim receipt",
            || self.receipt_once(hash, tx_hash),
        )
        .await?;

        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(EngineError::chain)?
            .ok_or_else(|| {
                EngineError::ChainVerification(format!("claim tx {tx_hash} body not found"))
            })?;

        decode_claim(
            self.address,
            tx_hash,
            receipt.status(),
            receipt.to,
            receipt.from,
            tx.input().as_ref(),
        )
    }

    fn contract_address(&self) -> String {
        Self::wallet_string(self.address)
    }
}

/// Validate a mined claim transaction and decode the claimed round id.
/// Takes the receipt/body fields directly so the checks run without a
/// provider.
fn decode_claim(
    contract: Address,
    tx_hash: &str,
    status: bool,
    to: Option<Address>,
    from: Address,
    input: &[u8],
) -> Result<VerifiedClaim> {
    if !status {
        return Err(EngineError::ChainVerification(format!(
            "claim tx {tx_hash} reverted"
        )));
    }
    if to != Some(contract) {
        return Err(EngineError::ChainVerification(format!(
            "claim tx {tx_hash} was not sent to the game contract"
        )));
    }
    let call = DunkGame::claimDailyRewardCall::abi_decode(input).map_err(|e| {
        EngineError::ChainVerification(format!("claim tx {tx_hash} is not claimDailyReward: {e}"))
    })?;
    let round_id = u64::try_from(call.roundId)
        .map_err(|_| EngineError::ChainVerification("claimed round id out of range".into()))?;

    Ok(VerifiedClaim {
        claimer_wallet: EvmLedger::wallet_string(from),
        round_id: round_id as i64,
    })
}
