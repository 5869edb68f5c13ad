//! The scheduler's `TimeoutHandler`: what happens when a deadline fires.
//!
//! Destination-first cancellation (spec's ordering mandate): a destination
//! timeout cancels the destination escrow and leaves the order at
//! `CancelledDst`; only the later-firing source timeout (invariant 8
//! guarantees `deadlineSrc > deadlineDst`) goes on to cancel the source
//! escrow and close the order out at `CancelledSrc`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relay_chain::ChainAdapter;
use relay_core::order::{OrderState, TimeoutKind};
use relay_core::types::{ChainKind, OrderId};
use relay_core::RelayerError;
use relay_store::OrderStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RefundHandler {
    store: Arc<OrderStore>,
    chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>,
}

impl RefundHandler {
    pub fn new(store: Arc<OrderStore>, chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>) -> Self {
        Self { store, chains }
    }

    fn adapter(&self, chain: ChainKind) -> Result<&Arc<dyn ChainAdapter>, RelayerError> {
        self.chains
            .get(&chain)
            .ok_or_else(|| RelayerError::Internal(format!("no adapter registered for {chain}")))
    }
}

#[async_trait]
impl relay_scheduler::TimeoutHandler for RefundHandler {
    async fn on_timeout(&self, order_id: OrderId, kind: TimeoutKind) -> Result<(), RelayerError> {
        let order = self
            .store
            .get_by_id(order_id)
            .await
            .map_err(RelayerError::from)?
            .ok_or_else(|| RelayerError::Internal(format!("timeout fired for unknown order {order_id}")))?;

        if order.state.is_terminal() {
            return Ok(());
        }

        let cancel = CancellationToken::new();

        match kind {
            TimeoutKind::DstTimeout => {
                if !matches!(order.state, OrderState::SuiLockPending | OrderState::SuiLocked | OrderState::ReadyForSecret) {
                    return Ok(());
                }
                let receipt = self.adapter(ChainKind::ObjectChain)?.cancel(&order, &cancel).await?;
                let _ = self.store.attach_dst_cancel_tx(order.id, &receipt.tx_hash).await;
                self.store
                    .update_state(order.id, order.state, OrderState::CancelledDst)
                    .await
                    .map_err(RelayerError::from)?;
                info!(order_hash = %order.order_hash, "destination timelock expired, escrow cancelled");
            }
            TimeoutKind::SrcTimeout => {
                if !matches!(order.state, OrderState::EthLocked | OrderState::EthLockPending | OrderState::CancelledDst) {
                    return Ok(());
                }
                let receipt = self.adapter(ChainKind::Evm)?.cancel(&order, &cancel).await?;
                let _ = self.store.attach_src_cancel_tx(order.id, &receipt.tx_hash).await;
                self.store
                    .update_state(order.id, order.state, OrderState::CancelledSrc)
                    .await
                    .map_err(RelayerError::from)?;
                info!(order_hash = %order.order_hash, "source timelock expired, escrow cancelled");
            }
        }
        Ok(())
    }
}
