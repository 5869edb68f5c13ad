//! In-memory chain adapter used by coordinator tests (relay-coordinator) and
//! by CI generally — no live RPC endpoint required. Production relayers of
//! this shape always ship a test double so the state machine can be
//! exercised deterministically.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::order::SwapOrder;
use relay_core::types::{ChainAddress, OrderHash};
use relay_core::RelayerError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{CancelReceipt, ChainAdapter, ChainEvent, LockReceipt, UnlockReceipt, WatchCursor};

/// Deterministic, idempotent in-memory adapter. `lock` is keyed by
/// `order_hash`: a second call returns the first receipt (P5).
pub struct MockAdapter {
    address: ChainAddress,
    locked: Mutex<HashSet<OrderHash>>,
    locked_receipts: Mutex<std::collections::HashMap<OrderHash, LockReceipt>>,
    fail_next_lock: Mutex<bool>,
}

impl MockAdapter {
    pub fn new(address: &str) -> Self {
        Self {
            address: ChainAddress(address.to_string()),
            locked: Mutex::new(HashSet::new()),
            locked_receipts: Mutex::new(std::collections::HashMap::new()),
            fail_next_lock: Mutex::new(false),
        }
    }

    /// Test hook: make the next `lock` call return a permanent error.
    pub fn fail_next_lock(&self) {
        *self.fail_next_lock.lock().unwrap() = true;
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    async fn connect(&self) -> Result<(), RelayerError> {
        Ok(())
    }

    fn address(&self) -> ChainAddress {
        self.address.clone()
    }

    async fn lock(&self, order: &SwapOrder, _cancel: &CancellationToken) -> Result<LockReceipt, RelayerError> {
        if let Some(existing) = self.locked_receipts.lock().unwrap().get(&order.order_hash) {
            return Ok(existing.clone());
        }
        if std::mem::take(&mut *self.fail_next_lock.lock().unwrap()) {
            return Err(RelayerError::PermanentChainError {
                chain: self.address.0.clone(),
                message: "mock: forced failure".into(),
            });
        }
        let receipt = LockReceipt {
            tx_hash: relay_core::types::TxHash(format!("0xmocklock{}", order.order_hash.to_hex())),
            escrow_ref: relay_core::types::EscrowRef(format!("escrow-{}", order.order_hash.to_hex())),
            block_number: 1,
            gas_used: Some(21_000),
        };
        self.locked.lock().unwrap().insert(order.order_hash);
        self.locked_receipts
            .lock()
            .unwrap()
            .insert(order.order_hash, receipt.clone());
        Ok(receipt)
    }

    async fn unlock(
        &self,
        order: &SwapOrder,
        _secret: &[u8; 32],
        _cancel: &CancellationToken,
    ) -> Result<UnlockReceipt, RelayerError> {
        Ok(UnlockReceipt {
            tx_hash: relay_core::types::TxHash(format!("0xmockunlock{}", order.order_hash.to_hex())),
            block_number: 2,
        })
    }

    async fn cancel(&self, order: &SwapOrder, _cancel: &CancellationToken) -> Result<CancelReceipt, RelayerError> {
        Ok(CancelReceipt {
            tx_hash: relay_core::types::TxHash(format!("0xmockcancel{}", order.order_hash.to_hex())),
            block_number: 3,
        })
    }

    async fn watch(
        &self,
        _cursor: WatchCursor,
        _out: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> Result<(), RelayerError> {
        cancel.cancelled().await;
        Ok(())
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(50)
    }
}
