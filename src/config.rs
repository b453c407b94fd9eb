//! Daemon configuration, read from the environment.
//!
//! Connection strings and keys stay out of argv; tunables have CLI
//! overrides in `main`.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Privileged Postgres connection string (bypasses row-level security;
    /// the restricted path belongs to the public read surfaces).
    pub database_url: String,
    pub rpc_url: String,
    pub contract_address: String,
    /// Operator key for renames and finalize transactions. Never signs
    /// claims.
    pub operator_signer_key: String,
    pub farcaster_api_url: String,
    pub farcaster_api_key: String,
    pub farcaster_signer_uuid: String,
    /// Optional base URL embedded into posted casts.
    pub embed_base_url: Option<String>,
    pub collector_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            rpc_url: required("RPC_URL")?,
            contract_address: required("GAME_CONTRACT_ADDRESS")?,
            operator_signer_key: required("OPERATOR_SIGNER_KEY")?,
            farcaster_api_url: std::env::var("FARCASTER_API_URL")
                .unwrap_or_else(|_| "https://api.neynar.com".to_string()),
            farcaster_api_key: required("FARCASTER_API_KEY")?,
            farcaster_signer_uuid: required("FARCASTER_SIGNER_UUID")?,
            embed_base_url: std::env::var("EMBED_BASE_URL").ok(),
            collector_interval_secs: std::env::var("COLLECTOR_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
        })
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| EngineError::Validation(format!("{name} is not set")))
}
