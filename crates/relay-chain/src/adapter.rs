use std::time::Duration;

use async_trait::async_trait;
use relay_core::order::SwapOrder;
use relay_core::types::{ChainAddress, EscrowRef, TxHash};
use relay_core::RelayerError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receipt returned by a successful `lock`.
#[derive(Debug, Clone)]
pub struct LockReceipt {
    pub tx_hash: TxHash,
    pub escrow_ref: EscrowRef,
    pub block_number: u64,
    pub gas_used: Option<u64>,
}

/// Receipt returned by a successful `unlock`.
#[derive(Debug, Clone)]
pub struct UnlockReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Receipt returned by a successful `cancel`.
#[derive(Debug, Clone)]
pub struct CancelReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// The kind of on-chain event a watcher observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEventKind {
    Locked,
    Unlocked,
    Cancelled,
}

/// An event surfaced by `ChainAdapter::watch`. Only events relevant to a
/// known `order_hash` are emitted; the watcher tags each with
/// `is_finalized` once the chain's configured finality depth is reached.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub kind: ChainEventKind,
    pub order_hash: relay_core::types::OrderHash,
    pub escrow_ref: Option<EscrowRef>,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub secret: Option<[u8; 32]>,
    pub is_finalized: bool,
}

/// A durable cursor so `watch` can resume after a restart without losing or
/// double-delivering events.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchCursor {
    pub last_processed_block: u64,
}

/// Uniform lock/unlock/cancel/watch capability over a single blockchain.
/// `EvmAdapter` and `ObjectChainAdapter` both implement this; the order
/// coordinator holds a `HashMap<ChainKind, Arc<dyn ChainAdapter>>` registry
/// and never branches on chain identity itself.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Validate RPC reachability, key material, chain-id/network-id, and
    /// configured contract addresses. Must be called once before any other
    /// operation.
    async fn connect(&self) -> Result<(), RelayerError>;

    /// This relayer's on-chain identity on this chain.
    fn address(&self) -> ChainAddress;

    /// Atomically fill the limit order (source chain) or create the mirror
    /// escrow (destination chain). Idempotent: a second `lock` for an
    /// already-filled `order_hash` must return the original receipt rather
    /// than double-spend (P5).
    async fn lock(&self, order: &SwapOrder, cancel: &CancellationToken) -> Result<LockReceipt, RelayerError>;

    /// Present the preimage to the escrow. Succeeds only if contract state
    /// permits (i.e. the escrow has not already been unlocked or cancelled).
    async fn unlock(
        &self,
        order: &SwapOrder,
        secret: &[u8; 32],
        cancel: &CancellationToken,
    ) -> Result<UnlockReceipt, RelayerError>;

    /// Invoke the escrow's timelocked refund path. Permitted only after the
    /// on-chain deadline.
    async fn cancel(&self, order: &SwapOrder, cancel: &CancellationToken) -> Result<CancelReceipt, RelayerError>;

    /// Start a long-running watch loop, fanning events relevant to
    /// `known_order_hashes` out over `out`. Resumable from `cursor` so a
    /// relayer restart never loses an event.
    async fn watch(
        &self,
        cursor: WatchCursor,
        out: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> Result<(), RelayerError>;

    /// Per-call RPC timeout used by `lock`/`unlock`/`cancel`.
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(relay_core::constants::DEFAULT_CHAIN_CALL_TIMEOUT_SECS)
    }
}
