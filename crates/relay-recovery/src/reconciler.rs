//! Startup reconciliation.
//!
//! An active pass run once at boot: read every non-terminal order,
//! re-arm its deadlines, and re-query the chain adapters for any lock that
//! might have landed while the process was down. Built on `ChainAdapter`'s
//! idempotent `lock` (P5) — calling it again after a restart returns the
//! already-published receipt instead of double-filling.

use std::collections::HashMap;
use std::sync::Arc;

use relay_chain::ChainAdapter;
use relay_core::order::{OrderState, SwapOrder, TimeoutKind};
use relay_core::types::ChainKind;
use relay_core::RelayerError;
use relay_scheduler::{DeadlineScheduler, TimeoutHandler};
use relay_store::OrderStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub orders_examined: usize,
    pub timeouts_rearmed: usize,
    pub locks_recovered: usize,
    pub errors: Vec<String>,
}

pub struct OrderReconciler<H: TimeoutHandler> {
    store: Arc<OrderStore>,
    chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>,
    scheduler: Arc<DeadlineScheduler<H>>,
}

impl<H: TimeoutHandler + 'static> OrderReconciler<H> {
    pub fn new(
        store: Arc<OrderStore>,
        chains: Arc<HashMap<ChainKind, Arc<dyn ChainAdapter>>>,
        scheduler: Arc<DeadlineScheduler<H>>,
    ) -> Self {
        Self { store, chains, scheduler }
    }

    /// Run once at process startup, before any new orders are admitted.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, RelayerError> {
        self.scheduler.recover().await?;

        let active = self.store.list_active().await.map_err(RelayerError::from)?;
        let mut report = ReconciliationReport { orders_examined: active.len(), ..Default::default() };

        for order in &active {
            self.reconcile_one(order, &mut report).await;
        }

        info!(
            examined = report.orders_examined,
            rearmed = report.timeouts_rearmed,
            recovered_locks = report.locks_recovered,
            errors = report.errors.len(),
            "startup reconciliation complete"
        );
        Ok(report)
    }

    async fn reconcile_one(&self, order: &SwapOrder, report: &mut ReconciliationReport) {
        if order.state.requires_armed_timeout() {
            if let Err(e) = self.scheduler.arm(order.id, TimeoutKind::SrcTimeout, order.deadline_src).await {
                report.errors.push(format!("order {}: re-arm src timeout: {e}", order.order_hash));
            } else {
                report.timeouts_rearmed += 1;
            }
            if let Err(e) = self.scheduler.arm(order.id, TimeoutKind::DstTimeout, order.deadline_dst).await {
                report.errors.push(format!("order {}: re-arm dst timeout: {e}", order.order_hash));
            } else {
                report.timeouts_rearmed += 1;
            }
        }

        let recovered = match order.state {
            OrderState::EthLockPending => self.recover_lock(order, ChainKind::Evm).await,
            OrderState::SuiLockPending => self.recover_lock(order, ChainKind::ObjectChain).await,
            _ => Ok(false),
        };

        match recovered {
            Ok(true) => report.locks_recovered += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(order_hash = %order.order_hash, error = %e, "reconciliation: lock recheck failed");
                report.errors.push(format!("order {}: lock recheck: {e}", order.order_hash));
            }
        }
    }

    /// Re-issue the idempotent `lock` call for an order stuck in a
    /// `*LockPending` state. If the adapter reports the lock already
    /// exists, this surfaces it without side effects beyond the receipt
    /// read — the coordinator's own task drives the actual state
    /// transition and escrow-ref attachment on its next pass.
    async fn recover_lock(&self, order: &SwapOrder, chain: ChainKind) -> Result<bool, RelayerError> {
        let adapter = self
            .chains
            .get(&chain)
            .ok_or_else(|| RelayerError::Internal(format!("no adapter registered for {chain}")))?;
        let cancel = CancellationToken::new();
        let receipt = adapter.lock(order, &cancel).await?;
        Ok(!receipt.tx_hash.0.is_empty())
    }
}
