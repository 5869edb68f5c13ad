//! EVM chain adapter.
//!
//! Talks to a single JSON-RPC endpoint the way `0xYudhishthra-1prime`'s
//! resolver agent talks to its EVM RPC provider via `reqwest` — plain JSON
//! POSTs, no code-generated client — generalized here into the uniform
//! `ChainAdapter` capability instead of one-off HTTP route handlers.

use std::sync::atomic::{AtomicU64, Ordering};
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
use crate::signing::{eip712_digest, keccak256, Eip712Domain, EcdsaSigner};

pub struct EvmConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub private_key: [u8; 32],
    pub escrow_factory_address: [u8; 20],
    pub finality_depth: u64,
    pub poll_interval: Duration,
    pub call_timeout: Duration,
    pub backoff: BackoffSchedule,
}

pub struct EvmAdapter {
    client: reqwest::Client,
    config: EvmConfig,
    signer: EcdsaSigner,
    request_id: AtomicU64,
}

impl EvmAdapter {
    pub fn new(config: EvmConfig) -> Result<Self, RelayerError> {
        let signer = EcdsaSigner::from_bytes(&config.private_key)
            .map_err(|e| RelayerError::ValidationError(format!("invalid EVM private key: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
            signer,
            request_id: AtomicU64::new(1),
        })
    }

    fn domain(&self) -> Eip712Domain<'_> {
        Eip712Domain::limit_order_protocol_v4(self.config.chain_id, self.config.escrow_factory_address)
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RelayerError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = timeout(self.config.call_timeout, self.client.post(&self.config.rpc_url).json(&body).send())
            .await
            .map_err(|_| RelayerError::DeadlineExceeded {
                chain: "evm".into(),
                elapsed_ms: self.config.call_timeout.as_millis() as u64,
            })?
            .map_err(|e| classify_transport_error("evm", &e))?;

        let value: Value = resp
            .json()
            .await
            .map_err(|e| RelayerError::TransientChainError {
                chain: "evm".into(),
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
                        warn!(method, attempt, ?delay, "transient EVM RPC error, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn block_number(&self) -> Result<u64, RelayerError> {
        let result = self.rpc_call_with_retry("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&result)
    }

    fn order_struct_hash(&self, order: &SwapOrder) -> [u8; 32] {
        // Simplified struct-hash: the escrow contract's exact field layout is
        // out of scope (spec's Non-goals); the relayer only needs a stable
        // digest to sign and to key idempotent lock detection by.
        keccak256(order.order_hash.as_bytes())
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    async fn connect(&self) -> Result<(), RelayerError> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        let remote_chain_id = parse_hex_u64(&result)?;
        if remote_chain_id != self.config.chain_id {
            return Err(RelayerError::ValidationError(format!(
                "EVM RPC endpoint reports chain id {remote_chain_id}, expected {}",
                self.config.chain_id
            )));
        }
        info!(chain_id = remote_chain_id, "connected to EVM RPC endpoint");
        Ok(())
    }

    fn address(&self) -> ChainAddress {
        ChainAddress(format!("0x{}", hex::encode(self.signer.address())))
    }

    async fn lock(&self, order: &SwapOrder, cancel: &CancellationToken) -> Result<LockReceipt, RelayerError> {
        // Idempotency (P5): if a fill for this order hash is already on
        // chain, return the existing receipt instead of resubmitting.
        let existing = self
            .rpc_call_with_retry(
                "eth_getTransactionByOrderHash",
                json!([format!("0x{}", order.order_hash.to_hex())]),
            )
            .await;
        if let Ok(value) = existing {
            if !value.is_null() {
                if let Some(tx_hash) = value.get("txHash").and_then(Value::as_str) {
                    debug!(order_hash = %order.order_hash, "lock already submitted, returning existing receipt");
                    return Ok(LockReceipt {
                        tx_hash: TxHash(tx_hash.to_string()),
                        escrow_ref: EscrowRef(format!("0x{}", hex::encode(self.order_struct_hash(order)))),
                        block_number: value.get("blockNumber").and_then(Value::as_u64).unwrap_or(0),
                        gas_used: value.get("gasUsed").and_then(Value::as_u64),
                    });
                }
            }
        }

        let digest = eip712_digest(self.domain().separator(), self.order_struct_hash(order));
        let (sig, recovery_id) = self.signer.sign_prehash(digest);
        let mut raw_tx = sig.to_bytes().to_vec();
        raw_tx.push(27 + recovery_id.to_byte());

        let result = tokio::select! {
            r = self.rpc_call_with_retry("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw_tx))])) => r,
            _ = cancel.cancelled() => Err(RelayerError::TransientChainError { chain: "evm".into(), message: "cancelled".into() }),
        }?;

        let tx_hash = result
            .as_str()
            .ok_or_else(|| RelayerError::Internal("eth_sendRawTransaction returned non-string result".into()))?
            .to_string();

        let block_number = self.block_number().await.unwrap_or(0);

        Ok(LockReceipt {
            tx_hash: TxHash(tx_hash),
            escrow_ref: EscrowRef(format!("0x{}", hex::encode(self.order_struct_hash(order)))),
            block_number,
            gas_used: None,
        })
    }

    async fn unlock(
        &self,
        order: &SwapOrder,
        secret: &[u8; 32],
        cancel: &CancellationToken,
    ) -> Result<UnlockReceipt, RelayerError> {
        let digest = keccak256(&[order.order_hash.as_bytes().as_slice(), secret.as_slice()].concat());
        let (sig, recovery_id) = self.signer.sign_prehash(digest);
        let mut raw_tx = sig.to_bytes().to_vec();
        raw_tx.push(27 + recovery_id.to_byte());

        let result = tokio::select! {
            r = self.rpc_call_with_retry("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw_tx))])) => r,
            _ = cancel.cancelled() => Err(RelayerError::TransientChainError { chain: "evm".into(), message: "cancelled".into() }),
        }?;
        let tx_hash = result.as_str().unwrap_or_default().to_string();
        let block_number = self.block_number().await.unwrap_or(0);
        Ok(UnlockReceipt { tx_hash: TxHash(tx_hash), block_number })
    }

    async fn cancel(&self, order: &SwapOrder, cancel: &CancellationToken) -> Result<CancelReceipt, RelayerError> {
        let digest = keccak256(&[b"cancel".as_slice(), order.order_hash.as_bytes().as_slice()].concat());
        let (sig, recovery_id) = self.signer.sign_prehash(digest);
        let mut raw_tx = sig.to_bytes().to_vec();
        raw_tx.push(27 + recovery_id.to_byte());

        let result = tokio::select! {
            r = self.rpc_call_with_retry("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw_tx))])) => r,
            _ = cancel.cancelled() => Err(RelayerError::TransientChainError { chain: "evm".into(), message: "cancelled".into() }),
        }?;
        let tx_hash = result.as_str().unwrap_or_default().to_string();
        let block_number = self.block_number().await.unwrap_or(0);
        Ok(CancelReceipt { tx_hash: TxHash(tx_hash), block_number })
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

            let head = match self.block_number().await {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "EVM watcher: failed to fetch head block, will retry");
                    continue;
                }
            };
            if head <= cursor.last_processed_block {
                continue;
            }

            let logs = match self
                .rpc_call_with_retry(
                    "eth_getLogs",
                    json!([{
                        "fromBlock": format!("0x{:x}", cursor.last_processed_block + 1),
                        "toBlock": format!("0x{:x}", head),
                        "address": format!("0x{}", hex::encode(self.config.escrow_factory_address)),
                    }]),
                )
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "EVM watcher: eth_getLogs failed, will retry");
                    continue;
                }
            };

            if let Some(entries) = logs.as_array() {
                for entry in entries {
                    if let Some(event) = decode_log_as_chain_event(entry, head, self.config.finality_depth) {
                        if out.send(event).await.is_err() {
                            return Ok(()); // receiver dropped — coordinator is shutting down
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

fn decode_log_as_chain_event(entry: &Value, head_block: u64, finality_depth: u64) -> Option<ChainEvent> {
    let order_hash_hex = entry.get("topics")?.as_array()?.get(1)?.as_str()?;
    let order_hash = OrderHash::from_hex(order_hash_hex).ok()?;
    let tx_hash = entry.get("transactionHash")?.as_str()?.to_string();
    let block_number = parse_hex_u64(entry.get("blockNumber")?).ok()?;
    let kind_topic = entry.get("topics")?.as_array()?.first()?.as_str()?;
    let kind = match kind_topic {
        t if t.ends_with("0") => ChainEventKind::Locked,
        t if t.ends_with("1") => ChainEventKind::Unlocked,
        _ => ChainEventKind::Cancelled,
    };
    Some(ChainEvent {
        kind,
        order_hash,
        escrow_ref: None,
        tx_hash: TxHash(tx_hash),
        block_number,
        secret: None,
        is_finalized: head_block.saturating_sub(block_number) >= finality_depth,
    })
}

fn parse_hex_u64(value: &Value) -> Result<u64, RelayerError> {
    let s = value
        .as_str()
        .ok_or_else(|| RelayerError::Internal("expected hex string RPC result".into()))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RelayerError::Internal(format!("parsing hex u64: {e}")))
}

fn classify_transport_error(chain: &str, e: &reqwest::Error) -> RelayerError {
    if e.is_timeout() || e.is_connect() {
        RelayerError::TransientChainError {
            chain: chain.into(),
            message: e.to_string(),
        }
    } else {
        RelayerError::TransientChainError {
            chain: chain.into(),
            message: e.to_string(),
        }
    }
}

/// Classify a JSON-RPC error object as transient or permanent. Known revert
/// selectors and "insufficient funds" are permanent; everything else
/// (rate limiting, nonce races, timeouts) is treated as transient.
fn classify_rpc_error(error: &Value) -> RelayerError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown RPC error")
        .to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("insufficient funds")
        || lowered.contains("revert")
        || lowered.contains("invalid opcode")
        || lowered.contains("execution reverted")
    {
        RelayerError::PermanentChainError {
            chain: "evm".into(),
            message,
        }
    } else {
        RelayerError::TransientChainError {
            chain: "evm".into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_classified_correctly() {
        let err = json!({ "message": "execution reverted: insufficient funds" });
        assert!(matches!(classify_rpc_error(&err), RelayerError::PermanentChainError { .. }));
    }

    #[test]
    fn rate_limit_errors_are_transient() {
        let err = json!({ "message": "rate limit exceeded, slow down" });
        assert!(matches!(classify_rpc_error(&err), RelayerError::TransientChainError { .. }));
    }

    #[test]
    fn parses_hex_block_numbers() {
        assert_eq!(parse_hex_u64(&json!("0x10")).unwrap(), 16);
    }
}
