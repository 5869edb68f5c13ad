//! Order Coordinator: the state machine that drives a `SwapOrder` from
//! intake to a terminal state.
//!
//! One spawned task per order, fed by whatever advances it (a chain
//! confirmation, a submitted secret, a fired timeout). A `Semaphore`
//! bounds how many orders can be simultaneously mid-flight in a chain
//! call.

use std::collections::HashMap;
use std::sync::Arc;

use relay_auction::BidSelectionPolicy;
use relay_chain::{ChainAdapter, LockReceipt};
use relay_core::constants::{
    deadlines_respect_ordering, AUCTION_WINDOW_MAX_SECS, AUCTION_WINDOW_MIN_SECS, DEFAULT_MAX_CONCURRENT_ORDERS,
};
use relay_core::order::{AuctionCurvePoint, OrderState, SwapOrder, TimeoutKind};
use relay_core::secret::hash_secret;
use relay_core::types::{Amount, ChainAddress, ChainKind, OrderHash, Timestamp};
use relay_core::RelayerError;
use relay_scheduler::DeadlineScheduler;
use relay_store::OrderStore;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::order_hash::{compute_order_hash, OrderHashInput};
use crate::refund::RefundHandler;

/// Everything a maker supplies when submitting a new order, before
/// `orderHash` is computed and the row exists.
pub struct OrderIntake {
    pub maker: ChainAddress,
    pub maker_dst_address: ChainAddress,
    pub receiver: ChainAddress,
    pub maker_asset: ChainAddress,
    pub taker_asset: ChainAddress,
    pub making_amount: Amount,
    pub taking_amount: Amount,
    pub secret_hash: relay_core::types::SecretHash,
    pub deadline_src: Timestamp,
    pub deadline_dst: Timestamp,
    pub auction_start: Timestamp,
    pub auction_end: Timestamp,
    pub start_rate: Amount,
    pub end_rate: Amount,
    pub auction_curve: Option<Vec<AuctionCurvePoint>>,
    pub original_order_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub salt_nonce: u64,
    pub finality_margin_src: Timestamp,
    pub finality_margin_dst: Timestamp,
}

/// The running coordinator. One instance per relayer process; holds the
/// collaborators every per-order driver task needs.
pub struct OrderCoordinator {
    store: Arc<OrderStore>,
    chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>,
    bid_policy: Arc<dyn BidSelectionPolicy>,
    scheduler: Arc<DeadlineScheduler<RefundHandler>>,
    inflight: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl OrderCoordinator {
    pub fn new(
        store: Arc<OrderStore>,
        chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>,
        bid_policy: Arc<dyn BidSelectionPolicy>,
        scheduler: Arc<DeadlineScheduler<RefundHandler>>,
        cancel: CancellationToken,
        max_concurrent_orders: Option<usize>,
    ) -> Self {
        Self {
            store,
            chains,
            bid_policy,
            scheduler,
            inflight: Arc::new(Semaphore::new(max_concurrent_orders.unwrap_or(DEFAULT_MAX_CONCURRENT_ORDERS))),
            cancel,
        }
    }

    /// Validate, hash, persist, and begin driving a new order. Returns the
    /// computed `orderHash` (spec's order-intake contract).
    pub async fn submit_order(&self, intake: OrderIntake) -> Result<OrderHash, RelayerError> {
        if intake.making_amount.is_zero() || intake.taking_amount.is_zero() {
            return Err(RelayerError::ValidationError("amounts must be non-zero".into()));
        }
        if intake.auction_end <= intake.auction_start {
            return Err(RelayerError::ValidationError("auction_end must be after auction_start".into()));
        }
        let window = intake.auction_end - intake.auction_start;
        if window < AUCTION_WINDOW_MIN_SECS || window > AUCTION_WINDOW_MAX_SECS {
            return Err(RelayerError::ValidationError(format!(
                "auction window of {window}s is outside [{AUCTION_WINDOW_MIN_SECS}, {AUCTION_WINDOW_MAX_SECS}]"
            )));
        }
        if !deadlines_respect_ordering(
            intake.deadline_src,
            intake.deadline_dst,
            intake.finality_margin_src,
            intake.finality_margin_dst,
        ) {
            return Err(RelayerError::ValidationError(
                "deadline_src does not leave enough room after deadline_dst and the finality margins".into(),
            ));
        }

        let order_hash = compute_order_hash(&OrderHashInput {
            maker: &intake.maker,
            receiver: &intake.receiver,
            maker_asset: &intake.maker_asset,
            taker_asset: &intake.taker_asset,
            making_amount: intake.making_amount,
            taking_amount: intake.taking_amount,
            secret_hash: &intake.secret_hash,
            deadline_src: intake.deadline_src,
            deadline_dst: intake.deadline_dst,
            salt_nonce: intake.salt_nonce,
        });

        let new_order = relay_store::NewOrder {
            order_hash,
            maker: intake.maker,
            maker_dst_address: intake.maker_dst_address,
            receiver: intake.receiver,
            maker_asset: intake.maker_asset,
            taker_asset: intake.taker_asset,
            making_amount: intake.making_amount,
            taking_amount: intake.taking_amount,
            secret_hash: intake.secret_hash,
            deadline_src: intake.deadline_src,
            deadline_dst: intake.deadline_dst,
            auction_start: intake.auction_start,
            auction_end: intake.auction_end,
            start_rate: intake.start_rate,
            end_rate: intake.end_rate,
            original_order_bytes: intake.original_order_bytes,
            signature: intake.signature,
        };

        let order = self.store.create_order(new_order).await.map_err(RelayerError::from)?;
        info!(order_hash = %order.order_hash, "order admitted");

        self.spawn_driver(order);
        Ok(order_hash)
    }

    /// Resolver reveal: verify the preimage, persist it, and resume the
    /// driver toward execution.
    pub async fn submit_secret(&self, order_hash: &OrderHash, secret: [u8; 32]) -> Result<(), RelayerError> {
        let order = self
            .store
            .get_by_hash(order_hash)
            .await
            .map_err(RelayerError::from)?
            .ok_or_else(|| RelayerError::ValidationError(format!("unknown order_hash {order_hash}")))?;

        let order = self.store.record_secret(order.id, secret).await.map_err(RelayerError::from)?;
        info!(order_hash = %order.order_hash, "secret accepted");
        self.spawn_driver(order);
        Ok(())
    }

    /// Resume driving every order the store considers non-terminal.
    /// Called once at startup after the scheduler's own `recover()`.
    pub async fn resume_active_orders(&self) -> Result<usize, RelayerError> {
        let active = self.store.list_active().await.map_err(RelayerError::from)?;
        let count = active.len();
        for order in active {
            self.spawn_driver(order);
        }
        info!(resumed = count, "coordinator resumed in-flight orders");
        Ok(count)
    }

    fn spawn_driver(&self, order: SwapOrder) {
        let store = self.store.clone();
        let chains = self.chains.clone();
        let bid_policy = self.bid_policy.clone();
        let scheduler = self.scheduler.clone();
        let inflight = self.inflight.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let _permit = match inflight.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            drive_order(store, chains, bid_policy, scheduler, order, cancel).await;
        });
    }
}

/// Drive one order from wherever it currently sits through to a terminal
/// state (or until shutdown is requested). Every step re-reads the order's
/// persisted state before acting, so this is safe to resume after a crash
/// at any point.
async fn drive_order(
    store: Arc<OrderStore>,
    chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>,
    _bid_policy: Arc<dyn BidSelectionPolicy>,
    scheduler: Arc<DeadlineScheduler<RefundHandler>>,
    mut order: SwapOrder,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        if order.state.is_terminal() {
            return;
        }

        let step = match order.state {
            OrderState::New => store
                .update_state(order.id, OrderState::New, OrderState::AuctionStarted)
                .await
                .map_err(RelayerError::from),
            OrderState::AuctionStarted => store
                .update_state(order.id, OrderState::AuctionStarted, OrderState::EthLockPending)
                .await
                .map_err(RelayerError::from),
            OrderState::EthLockPending => match lock(&chains, ChainKind::Evm, &order, &cancel).await {
                Ok(receipt) => {
                    if let Err(e) = store.attach_src_escrow(order.id, &receipt.escrow_ref, &receipt.tx_hash).await {
                        warn!(order_hash = %order.order_hash, error = %e, "src escrow already attached");
                    }
                    store
                        .update_state(order.id, OrderState::EthLockPending, OrderState::EthLocked)
                        .await
                        .map_err(RelayerError::from)
                }
                Err(e) => Err(e),
            },
            OrderState::EthLocked => {
                if let Err(e) = scheduler.arm(order.id, TimeoutKind::SrcTimeout, order.deadline_src).await {
                    error!(order_hash = %order.order_hash, error = %e, "failed to arm source timeout");
                }
                store
                    .update_state(order.id, OrderState::EthLocked, OrderState::SuiLockPending)
                    .await
                    .map_err(RelayerError::from)
            }
            OrderState::SuiLockPending => match lock(&chains, ChainKind::ObjectChain, &order, &cancel).await {
                Ok(receipt) => {
                    if let Err(e) = store.attach_dst_escrow(order.id, &receipt.escrow_ref, &receipt.tx_hash).await {
                        warn!(order_hash = %order.order_hash, error = %e, "dst escrow already attached");
                    }
                    store
                        .update_state(order.id, OrderState::SuiLockPending, OrderState::SuiLocked)
                        .await
                        .map_err(RelayerError::from)
                }
                Err(e) => Err(e),
            },
            OrderState::SuiLocked => {
                if let Err(e) = scheduler.arm(order.id, TimeoutKind::DstTimeout, order.deadline_dst).await {
                    error!(order_hash = %order.order_hash, error = %e, "failed to arm destination timeout");
                }
                store
                    .update_state(order.id, OrderState::SuiLocked, OrderState::ReadyForSecret)
                    .await
                    .map_err(RelayerError::from)
            }
            OrderState::ReadyForSecret => {
                // Waiting on `submit_secret`; this task's job here is done
                // until the coordinator resumes it with the secret in hand.
                return;
            }
            OrderState::SecretReceived => match execute(&store, &chains, &order, &cancel).await {
                Ok(()) => {
                    scheduler.cancel(order.id, TimeoutKind::SrcTimeout).await;
                    scheduler.cancel(order.id, TimeoutKind::DstTimeout).await;
                    store
                        .update_state(order.id, OrderState::SecretReceived, OrderState::Executed)
                        .await
                        .map_err(RelayerError::from)
                }
                Err(e) => Err(e),
            },
            OrderState::Executed
            | OrderState::CancelledDst
            | OrderState::CancelledSrc
            | OrderState::Refunded
            | OrderState::Error => return,
        };

        match step {
            Ok(updated) => order = updated,
            Err(e) if e.is_transient() => {
                warn!(order_hash = %order.order_hash, error = %e, "transient error driving order, will retry");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                }
                match store.get_by_id(order.id).await {
                    Ok(Some(fresh)) => order = fresh,
                    Ok(None) => return,
                    Err(_) => continue,
                }
            }
            Err(e) => {
                error!(order_hash = %order.order_hash, error = %e, "order driver failed permanently");
                let _ = store.set_error_message(order.id, &e.to_string()).await;
                let _ = store.update_state(order.id, order.state, OrderState::Error).await;
                return;
            }
        }
    }
}

async fn lock(
    chains: &HashMap<ChainKind, Arc<dyn ChainAdapter>>,
    chain: ChainKind,
    order: &SwapOrder,
    cancel: &CancellationToken,
) -> Result<LockReceipt, RelayerError> {
    let adapter = chains
        .get(&chain)
        .ok_or_else(|| RelayerError::Internal(format!("no adapter registered for {chain}")))?;
    adapter.lock(order, cancel).await
}

/// Destination-first unlock: reveal the secret on the destination chain
/// before the source, so a crash between the two legs leaves the resolver
/// still able to claim the source funds with the now-public secret rather
/// than stranding the maker's destination funds unclaimed.
async fn execute(
    store: &OrderStore,
    chains: &HashMap<ChainKind, Arc<dyn ChainAdapter>>,
    order: &SwapOrder,
    cancel: &CancellationToken,
) -> Result<(), RelayerError> {
    let secret = order
        .secret
        .ok_or_else(|| RelayerError::Internal("execute reached without a secret on file".into()))?;
    debug_assert_eq!(hash_secret(&secret), order.secret_hash);

    if order.dst_withdraw_tx_hash.is_none() {
        let dst = chains
            .get(&ChainKind::ObjectChain)
            .ok_or_else(|| RelayerError::Internal("no adapter registered for object_chain".into()))?;
        let receipt = dst.unlock(order, &secret, cancel).await?;
        if let Err(e) = store.attach_dst_withdraw_tx(order.id, &receipt.tx_hash).await {
            warn!(order_hash = %order.order_hash, error = %e, "dst withdraw tx already attached");
        }
    }

    if order.src_withdraw_tx_hash.is_none() {
        let src = chains
            .get(&ChainKind::Evm)
            .ok_or_else(|| RelayerError::Internal("no adapter registered for evm".into()))?;
        let receipt = src.unlock(order, &secret, cancel).await?;
        if let Err(e) = store.attach_src_withdraw_tx(order.id, &receipt.tx_hash).await {
            warn!(order_hash = %order.order_hash, error = %e, "src withdraw tx already attached");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_intake_rejects_are_exercised_via_submit_order() {
        // Validation itself is pure logic; covered by relay_core::constants
        // and relay_core::order unit tests. Here we only confirm the type
        // shape compiles and carries the fields submit_order reads.
        let intake = OrderIntake {
            maker: ChainAddress("0xmaker".into()),
            maker_dst_address: ChainAddress("0xm-dst".into()),
            receiver: ChainAddress("0xreceiver".into()),
            maker_asset: ChainAddress("0xassetA".into()),
            taker_asset: ChainAddress("0xassetB".into()),
            making_amount: Amount::from(0u64),
            taking_amount: Amount::from(1u64),
            secret_hash: relay_core::types::Digest32::from_bytes([1u8; 32]),
            deadline_src: 1000,
            deadline_dst: 500,
            auction_start: 0,
            auction_end: 120,
            start_rate: Amount::from(10u64),
            end_rate: Amount::from(5u64),
            auction_curve: None,
            original_order_bytes: vec![],
            signature: vec![],
            salt_nonce: 1,
            finality_margin_src: 10,
            finality_margin_dst: 10,
        };
        assert!(intake.making_amount.is_zero());
    }
}
