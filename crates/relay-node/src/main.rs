//! relayer — the Relayer Coordinator binary.
//!
//! Startup sequence (subcommand `relayer`):
//!   1. Load and validate `RelayerConfig` from the environment
//!   2. Open the Postgres pool
//!   3. Reconcile: recover the scheduler's durable queue, re-arm timeouts,
//!      recheck any order stuck mid-lock
//!   4. Start the scheduler loop and resume every active order's driver
//!   5. Run until SIGINT/SIGTERM, then drain with a bounded timeout
//!
//! Subcommand `migrate` applies pending `.sql` files and exits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use relay_auction::{BidSelectionPolicy, FirstAcceptableBid};
use relay_chain::{ChainAdapter, EvmAdapter, EvmConfig, ObjectChainAdapter, ObjectChainConfig};
use relay_core::backoff::BackoffSchedule;
use relay_core::constants::{
    DEFAULT_CHAIN_CALL_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_ORDERS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_SECS,
    DEFAULT_RETRY_FACTOR, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use relay_core::types::ChainKind;
use relay_coordinator::{OrderCoordinator, RefundHandler, Shutdown};
use relay_recovery::OrderReconciler;
use relay_scheduler::DeadlineScheduler;
use relay_store::OrderStore;

#[derive(Parser, Debug)]
#[command(name = "relayer", version, about = "Cross-chain atomic swap relayer coordinator")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the coordinator and run until shutdown.
    Relayer,
    /// Apply pending SQL migrations and exit.
    Migrate,
}

/// Every configuration value this process needs, loaded from the
/// environment and validated once at startup — a partial boot is never
/// acceptable, so any missing or malformed value is a fail-fast exit.
struct RelayerConfig {
    database_url: String,
    max_connections: u32,

    evm_rpc_url: String,
    evm_private_key: [u8; 32],
    evm_chain_id: u64,
    evm_finality_depth: u64,
    evm_escrow_factory_address: [u8; 20],

    object_chain_rpc_url: String,
    object_chain_private_key: [u8; 32],
    object_chain_network: String,
    object_chain_package_id: String,
    object_chain_finality_checkpoints: u64,

    poll_interval: Duration,
    retry_interval_secs: u64,
    max_retries: u32,
    max_concurrent_orders: usize,
    shutdown_timeout: Duration,
}

impl RelayerConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: require_env("DATABASE_URL")?,
            max_connections: parse_env_or("DATABASE_MAX_CONNECTIONS", 10)?,

            evm_rpc_url: require_env("EVM_RPC_URL")?,
            evm_private_key: parse_hex32_env("EVM_PRIVATE_KEY")?,
            evm_chain_id: parse_env("EVM_CHAIN_ID")?,
            evm_finality_depth: parse_env_or("EVM_FINALITY_DEPTH", 12)?,
            evm_escrow_factory_address: parse_hex20_env("EVM_ESCROW_FACTORY_ADDRESS")?,

            object_chain_rpc_url: require_env("OBJECT_CHAIN_RPC_URL")?,
            object_chain_private_key: parse_hex32_env("OBJECT_CHAIN_PRIVATE_KEY")?,
            object_chain_network: std::env::var("OBJECT_CHAIN_NETWORK").unwrap_or_else(|_| "mainnet".into()),
            object_chain_package_id: require_env("OBJECT_CHAIN_PACKAGE_ID")?,
            object_chain_finality_checkpoints: parse_env_or("OBJECT_CHAIN_FINALITY_CHECKPOINTS", 2)?,

            poll_interval: Duration::from_millis(parse_env_or("POLL_INTERVAL_SECS", 5u64)? * 1000),
            retry_interval_secs: parse_env_or("RETRY_INTERVAL_SECS", DEFAULT_RETRY_BASE_SECS)?,
            max_retries: parse_env_or("MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            max_concurrent_orders: parse_env_or("MAX_CONCURRENT_ORDERS", DEFAULT_MAX_CONCURRENT_ORDERS)?,
            shutdown_timeout: Duration::from_secs(parse_env_or("SHUTDOWN_TIMEOUT_SECS", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?),
        })
    }

    fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(
            Duration::from_secs(self.retry_interval_secs),
            DEFAULT_RETRY_FACTOR,
            Duration::from_secs(self.retry_interval_secs * 10),
            self.max_retries,
        )
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn parse_env<T: std::str::FromStr>(key: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = require_env(key)?;
    raw.parse::<T>().map_err(|e| anyhow::anyhow!("invalid {key}: {e}"))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_hex32_env(key: &str) -> anyhow::Result<[u8; 32]> {
    let raw = require_env(key)?;
    let bytes = hex::decode(raw.trim_start_matches("0x")).with_context(|| format!("{key} is not valid hex"))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("{key} must be 32 bytes, got {}", v.len()))
}

fn parse_hex20_env(key: &str) -> anyhow::Result<[u8; 20]> {
    let raw = require_env(key)?;
    let bytes = hex::decode(raw.trim_start_matches("0x")).with_context(|| format!("{key} is not valid hex"))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("{key} must be 20 bytes, got {}", v.len()))
}

fn now_unix() -> relay_core::types::Timestamp {
    chrono::Utc::now().timestamp()
}

fn build_chains(config: &RelayerConfig) -> anyhow::Result<Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>> {
    let call_timeout = Duration::from_secs(DEFAULT_CHAIN_CALL_TIMEOUT_SECS);
    let backoff = config.backoff();

    let evm = EvmAdapter::new(EvmConfig {
        rpc_url: config.evm_rpc_url.clone(),
        chain_id: config.evm_chain_id,
        private_key: config.evm_private_key,
        escrow_factory_address: config.evm_escrow_factory_address,
        finality_depth: config.evm_finality_depth,
        poll_interval: config.poll_interval,
        call_timeout,
        backoff,
    })
    .context("constructing EVM adapter")?;

    let object_chain = ObjectChainAdapter::new(ObjectChainConfig {
        rpc_url: config.object_chain_rpc_url.clone(),
        network: config.object_chain_network.clone(),
        private_key: config.object_chain_private_key,
        package_id: config.object_chain_package_id.clone(),
        finality_checkpoints: config.object_chain_finality_checkpoints,
        poll_interval: config.poll_interval,
        call_timeout,
        backoff,
    });

    let mut chains: HashMap<ChainKind, Arc<dyn ChainAdapter>> = HashMap::new();
    chains.insert(ChainKind::Evm, Arc::new(evm));
    chains.insert(ChainKind::ObjectChain, Arc::new(object_chain));
    Ok(Arc::new(chains))
}

/// `Ok(true)` if the run ended because of a shutdown signal (exit code 2),
/// `Ok(false)` for any other clean termination (exit code 0).
async fn run_relayer(config: RelayerConfig) -> anyhow::Result<bool> {
    let store = Arc::new(
        OrderStore::connect(&config.database_url, config.max_connections)
            .await
            .context("connecting to the order store")?,
    );

    let chains = build_chains(&config)?;
    for (kind, adapter) in chains.iter() {
        adapter.connect().await.with_context(|| format!("connecting to {kind}"))?;
        info!(chain = %kind, address = %adapter.address(), "chain adapter connected");
    }

    let shutdown = Shutdown::new(config.shutdown_timeout);
    let cancel = shutdown.token();

    let refund_handler = Arc::new(RefundHandler::new(store.clone(), chains.clone()));
    let scheduler = Arc::new(DeadlineScheduler::new(store.clone(), refund_handler, config.backoff()));

    let reconciler = OrderReconciler::new(store.clone(), chains.clone(), scheduler.clone());
    let report = reconciler.reconcile().await.context("startup reconciliation")?;
    info!(
        examined = report.orders_examined,
        rearmed = report.timeouts_rearmed,
        recovered_locks = report.locks_recovered,
        "reconciliation finished"
    );

    let bid_policy: Arc<dyn BidSelectionPolicy> = Arc::new(FirstAcceptableBid);
    let coordinator = OrderCoordinator::new(
        store,
        chains,
        bid_policy,
        scheduler.clone(),
        cancel.clone(),
        Some(config.max_concurrent_orders),
    );
    coordinator.resume_active_orders().await.context("resuming active orders")?;

    let scheduler_cancel = cancel.clone();
    let scheduler_for_loop = scheduler.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler_for_loop.run(scheduler_cancel, now_unix).await;
    });
    shutdown.track(scheduler_handle).await;

    info!("relayer ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, shutting down");
        }
    }

    shutdown.shutdown().await;
    Ok(true)
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

async fn run_migrate(config: &RelayerConfig) -> anyhow::Result<()> {
    let store = OrderStore::connect(&config.database_url, config.max_connections)
        .await
        .context("connecting to the order store")?;
    store.run_migrations().await.context("running migrations")?;
    info!("migrations applied");
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,relayer=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = match RelayerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return std::process::ExitCode::from(1);
        }
    };

    match args.command {
        Command::Relayer => match run_relayer(config).await {
            Ok(true) => std::process::ExitCode::from(2),
            Ok(false) => std::process::ExitCode::from(0),
            Err(e) => {
                error!(error = %e, "fatal error");
                std::process::ExitCode::from(1)
            }
        },
        Command::Migrate => match run_migrate(&config).await {
            Ok(()) => std::process::ExitCode::from(0),
            Err(e) => {
                error!(error = %e, "fatal error");
                std::process::ExitCode::from(1)
            }
        },
    }
}
