//! Object-chain (Sui-family) adapter.
//!
//! Same shape as `evm.rs` — a thin `reqwest` JSON-RPC client behind the
//! `ChainAdapter` trait — but signs with Ed25519 and tracks finality by
//! checkpoint number instead of block confirmations.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::backoff::BackoffSchedule;
use relay_core::order::SwapOrder;
use relay_core::types::{ChainAddress, EscrowRef, OrderHash, TxHash};
use relay_core::RelayerError;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{CancelReceipt, ChainAdapter, ChainEvent, ChainEventKind, LockReceipt, UnlockReceipt, WatchCursor};
use crate::signing::ed25519::Ed25519Signer;

pub struct ObjectChainConfig {
    pub rpc_url: String,
    pub network: String,
    pub private_key: [u8; 32],
    pub package_id: String,
    pub finality_checkpoints: u64,
    pub poll_interval: Duration,
    pub call_timeout: Duration,
    pub backoff: BackoffSchedule,
}

pub struct ObjectChainAdapter {
    client: reqwest::Client,
    config: ObjectChainConfig,
    signer: Ed25519Signer,
}

impl ObjectChainAdapter {
    pub fn new(config: ObjectChainConfig) -> Self {
        let signer = Ed25519Signer::from_bytes(&config.private_key);
        Self {
            client: reqwest::Client::new(),
            config,
            signer,
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RelayerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = timeout(self.config.call_timeout, self.client.post(&self.config.rpc_url).json(&body).send())
            .await
            .map_err(|_| RelayerError::DeadlineExceeded {
                chain: "object_chain".into(),
                elapsed_ms: self.config.call_timeout.as_millis() as u64,
            })?
            .map_err(|e| RelayerError::TransientChainError {
                chain: "object_chain".into(),
                message: e.to_string(),
            })?;

        let value: Value = resp.json().await.map_err(|e| RelayerError::TransientChainError {
            chain: "object_chain".into(),
            message: format!("decoding RPC response: {e}"),
        })?;

        if let Some(error) = value.get("error") {
            return Err(classify_rpc_error(error));
        }
        Ok(value["result"].clone())
    }

    async fn rpc_call_with_retry(&self, method: &str, params: Value) -> Result<Value, RelayerError> {
        let mut attempt = 0;
        loop {
            match self.rpc_call(method, params.clone()).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => match self.config.backoff.delay_for(attempt) {
                    Some(delay) => {
                        warn!(method, attempt, ?delay, "transient object-chain RPC error, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn latest_checkpoint(&self) -> Result<u64, RelayerError> {
        let result = self.rpc_call_with_retry("sui_getLatestCheckpointSequenceNumber", json!([])).await?;
        result
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RelayerError::Internal("expected checkpoint sequence number as string".into()))
    }

    fn escrow_object_id(&self, order: &SwapOrder) -> String {
        // The actual move-call object layout is out of scope; the relayer
        // only needs a stable, content-addressed handle for idempotent
        // lock detection.
        format!("0x{}", hex::encode(order.order_hash.as_bytes()))
    }
}

#[async_trait]
impl ChainAdapter for ObjectChainAdapter {
    async fn connect(&self) -> Result<(), RelayerError> {
        let result = self.rpc_call("sui_getChainIdentifier", json!([])).await?;
        info!(identifier = ?result, network = %self.config.network, "connected to object-chain RPC endpoint");
        Ok(())
    }

    fn address(&self) -> ChainAddress {
        ChainAddress(format!("0x{}", hex::encode(self.signer.public_key_bytes())))
    }

    async fn lock(&self, order: &SwapOrder, cancel: &CancellationToken) -> Result<LockReceipt, RelayerError> {
        let object_id = self.escrow_object_id(order);

        let existing = self
            .rpc_call_with_retry("sui_getObject", json!([object_id.clone(), { "showContent": true }]))
            .await;
        if let Ok(value) = existing {
            if !value.get("error").map(|_| true).unwrap_or(false) {
                if let Some(tx_digest) = value.get("data").and_then(|d| d.get("previousTransaction")).and_then(Value::as_str) {
                    debug!(order_hash = %order.order_hash, "lock object already exists, returning existing receipt");
                    return Ok(LockReceipt {
                        tx_hash: TxHash(tx_digest.to_string()),
                        escrow_ref: EscrowRef(object_id),
                        block_number: 0,
                        gas_used: None,
                    });
                }
            }
        }

        let payload = [order.order_hash.as_bytes().as_slice(), order.secret_hash.as_bytes().as_slice()].concat();
        let signature = self.signer.sign(&payload);

        let result = tokio::select! {
            r = self.rpc_call_with_retry(
                "sui_executeTransactionBlock",
                json!([
                    { "package": self.config.package_id, "module": "htlc_escrow", "function": "lock" },
                    hex::encode(signature),
                ]),
            ) => r,
            _ = cancel.cancelled() => Err(RelayerError::TransientChainError { chain: "object_chain".into(), message: "cancelled".into() }),
        }?;

        let tx_digest = result
            .get("digest")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayerError::Internal("sui_executeTransactionBlock missing digest".into()))?
            .to_string();

        Ok(LockReceipt {
            tx_hash: TxHash(tx_digest),
            escrow_ref: EscrowRef(object_id),
            block_number: 0,
            gas_used: None,
        })
    }

    async fn unlock(
        &self,
        order: &SwapOrder,
        secret: &[u8; 32],
        cancel: &CancellationToken,
    ) -> Result<UnlockReceipt, RelayerError> {
        let payload = [order.order_hash.as_bytes().as_slice(), secret.as_slice()].concat();
        let signature = self.signer.sign(&payload);

        let result = tokio::select! {
            r = self.rpc_call_with_retry(
                "sui_executeTransactionBlock",
                json!([
                    { "package": self.config.package_id, "module": "htlc_escrow", "function": "claim" },
                    hex::encode(signature),
                    hex::encode(secret),
                ]),
            ) => r,
            _ = cancel.cancelled() => Err(RelayerError::TransientChainError { chain: "object_chain".into(), message: "cancelled".into() }),
        }?;
        let tx_digest = result.get("digest").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(UnlockReceipt { tx_hash: TxHash(tx_digest), block_number: 0 })
    }

    async fn cancel(&self, order: &SwapOrder, cancel: &CancellationToken) -> Result<CancelReceipt, RelayerError> {
        let payload = [b"cancel".as_slice(), order.order_hash.as_bytes().as_slice()].concat();
        let signature = self.signer.sign(&payload);

        let result = tokio::select! {
            r = self.rpc_call_with_retry(
                "sui_executeTransactionBlock",
                json!([
                    { "package": self.config.package_id, "module": "htlc_escrow", "function": "refund" },
                    hex::encode(signature),
                ]),
            ) => r,
            _ = cancel.cancelled() => Err(RelayerError::TransientChainError { chain: "object_chain".into(), message: "cancelled".into() }),
        }?;
        let tx_digest = result.get("digest").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(CancelReceipt { tx_hash: TxHash(tx_digest), block_number: 0 })
    }

    async fn watch(
        &self,
        mut cursor: WatchCursor,
        out: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> Result<(), RelayerError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let head = match self.latest_checkpoint().await {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "object-chain watcher: failed to fetch checkpoint, will retry");
                    continue;
                }
            };
            if head <= cursor.last_processed_block {
                continue;
            }

            let events = match self
                .rpc_call_with_retry(
                    "suix_queryEvents",
                    json!([
                        { "MoveModule": { "package": self.config.package_id, "module": "htlc_escrow" } },
                        null,
                        100,
                        false,
                    ]),
                )
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "object-chain watcher: suix_queryEvents failed, will retry");
                    continue;
                }
            };

            if let Some(entries) = events.get("data").and_then(Value::as_array) {
                for entry in entries {
                    if let Some(event) = decode_move_event(entry, head, self.config.finality_checkpoints) {
                        if out.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }

            cursor.last_processed_block = head;
        }
    }

    fn call_timeout(&self) -> Duration {
        self.config.call_timeout
    }
}

fn decode_move_event(entry: &Value, head_checkpoint: u64, finality_checkpoints: u64) -> Option<ChainEvent> {
    let parsed = entry.get("parsedJson")?;
    let order_hash_hex = parsed.get("order_hash")?.as_str()?;
    let order_hash = OrderHash::from_hex(order_hash_hex).ok()?;
    let tx_digest = entry.get("id")?.get("txDigest")?.as_str()?.to_string();
    let checkpoint: u64 = entry.get("checkpoint")?.as_str()?.parse().ok()?;
    let event_type = entry.get("type")?.as_str()?;
    let kind = if event_type.ends_with("LockedEvent") {
        ChainEventKind::Locked
    } else if event_type.ends_with("ClaimedEvent") {
        ChainEventKind::Unlocked
    } else {
        ChainEventKind::Cancelled
    };
    let secret = if kind == ChainEventKind::Unlocked {
        parsed
            .get("secret")
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
            .filter(|b| b.len() == 32)
            .map(|b| {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&b);
                arr
            })
    } else {
        None
    };
    Some(ChainEvent {
        kind,
        order_hash,
        escrow_ref: None,
        tx_hash: TxHash(tx_digest),
        block_number: checkpoint,
        secret,
        is_finalized: head_checkpoint.saturating_sub(checkpoint) >= finality_checkpoints,
    })
}

fn classify_rpc_error(error: &Value) -> RelayerError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown RPC error")
        .to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("object not found") || lowered.contains("move abort") || lowered.contains("insufficient gas") {
        RelayerError::PermanentChainError {
            chain: "object_chain".into(),
            message,
        }
    } else {
        RelayerError::TransientChainError {
            chain: "object_chain".into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_not_found_is_permanent() {
        let err = json!({ "message": "object not found" });
        assert!(matches!(classify_rpc_error(&err), RelayerError::PermanentChainError { .. }));
    }

    #[test]
    fn transient_network_errors_stay_transient() {
        let err = json!({ "message": "temporarily overloaded" });
        assert!(matches!(classify_rpc_error(&err), RelayerError::TransientChainError { .. }));
    }
}
