//! dunkpotd — round lifecycle daemon
//!
//! Runs the two timer-triggered batch jobs: the engagement collector and
//! once-per-boundary round settlement. Admission and claim verification are
//! request-driven and live behind the serving layer, which links this crate
//! as a library.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use dunkpot::{
    current_round_id, Collector, Config, EvmLedger, FarcasterClient, PgStore, Settlement,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dunkpotd", version, about = "Dunkpot round lifecycle daemon")]
struct Args {
    /// Engagement poll interval in seconds (overrides COLLECTOR_INTERVAL_SECS)
    #[arg(long)]
    collector_interval: Option<u64>,

    /// Settle one specific round and exit (operator tool)
    #[arg(long)]
    settle_round: Option<i64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dunkpot=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return;
        }
    };

    info!("════════════════════════════════════════════════════════════");
    info!("  Dunkpot v{} — round lifecycle daemon", VERSION);
    info!("════════════════════════════════════════════════════════════");
    info!(
        "Contract: {} | RPC: {} | Current round: {}",
        config.contract_address,
        config.rpc_url,
        current_round_id()
    );

    let store = match PgStore::connect(&config.database_url).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return;
        }
    };
    let chain = match EvmLedger::new(
        &config.rpc_url,
        &config.contract_address,
        &config.operator_signer_key,
    ) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to build chain client: {}", e);
            return;
        }
    };
    let content = Arc::new(FarcasterClient::new(
        &config.farcaster_api_url,
        &config.farcaster_api_key,
        &config.farcaster_signer_uuid,
    ));

    let settlement = Arc::new(Settlement::new(store.clone(), chain.clone()));

    if let Some(round_id) = args.settle_round {
        match settlement.settle(round_id).await {
            Ok(outcome) => info!("Round {} settlement: {:?}", round_id, outcome),
            Err(e) => error!("Round {} settlement failed: {}", round_id, e),
        }
        return;
    }

    let collector = Arc::new(Collector::new(store.clone(), content.clone()));
    let interval_secs = args
        .collector_interval
        .unwrap_or(config.collector_interval_secs);

    // Engagement polling
    let collector_task = collector.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = collector_task.run().await {
                error!("Engagement run failed: {}", e);
            }
        }
    });

    // Once-per-boundary settlement of the just-ended round. On failure the
    // round rolled back to active; the operator alert in the log is the
    // signal to re-run via --settle-round.
    let settlement_task = settlement.clone();
    tokio::spawn(async move {
        let mut last_attempted = current_round_id() - 2;
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let target = current_round_id() - 1;
            if target <= last_attempted {
                continue;
            }
            last_attempted = target;
            match settlement_task.settle(target).await {
                Ok(outcome) => info!("Round {} settlement: {:?}", target, outcome),
                Err(e) => error!("Round {} settlement failed: {}", target, e),
            }
        }
    });

    info!(
        "Dunkpot running. Collector every {}s, settlement at round boundaries.",
        interval_secs
    );

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
}
