//! Conversions between `relay_core::order::SwapOrder` and the flat
//! Postgres row shape (`sqlx::FromRow` needs primitive column types, not
//! our domain newtypes).

use std::str::FromStr;

use relay_core::order::{AuctionCurvePoint, OrderState, SwapOrder};
use relay_core::types::{Amount, ChainAddress, Digest32, EscrowRef, TxHash};
use sqlx::types::BigDecimal;

use crate::store::StoreError;

#[derive(sqlx::FromRow)]
pub struct SwapOrderRow {
    pub id: i64,
    pub order_hash: String,
    pub state: String,
    pub maker: String,
    pub maker_dst_address: String,
    pub receiver: String,
    pub maker_asset: String,
    pub taker_asset: String,
    pub making_amount: BigDecimal,
    pub taking_amount: BigDecimal,
    pub secret_hash: String,
    pub secret: Option<String>,
    pub deadline_src: i64,
    pub deadline_dst: i64,
    pub src_escrow_address: Option<String>,
    pub src_lock_tx_hash: Option<String>,
    pub src_withdraw_tx_hash: Option<String>,
    pub src_cancel_tx_hash: Option<String>,
    pub dst_escrow_id: Option<String>,
    pub dst_lock_tx_hash: Option<String>,
    pub dst_withdraw_tx_hash: Option<String>,
    pub dst_cancel_tx_hash: Option<String>,
    pub auction_start: i64,
    pub auction_end: i64,
    pub start_rate: BigDecimal,
    pub end_rate: BigDecimal,
    pub auction_curve: Option<serde_json::Value>,
    pub original_order_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub fn amount_to_bigdecimal(amount: Amount) -> BigDecimal {
    BigDecimal::from_str(&amount.to_string()).expect("U256 decimal string is always valid BigDecimal")
}

pub fn bigdecimal_to_amount(value: &BigDecimal) -> Result<Amount, StoreError> {
    Amount::from_dec_str(&value.to_string()).map_err(|e| StoreError::Decode(format!("amount out of range: {e}")))
}

impl SwapOrderRow {
    pub fn into_domain(self) -> Result<SwapOrder, StoreError> {
        let secret = match self.secret {
            Some(hex_str) => Some(decode_secret(&hex_str)?),
            None => None,
        };
        let auction_curve = match self.auction_curve {
            Some(v) => Some(
                serde_json::from_value::<Vec<AuctionCurvePoint>>(v)
                    .map_err(|e| StoreError::Decode(format!("auction_curve: {e}")))?,
            ),
            None => None,
        };

        Ok(SwapOrder {
            id: self.id,
            order_hash: Digest32::from_hex(&self.order_hash).map_err(|e| StoreError::Decode(e.to_string()))?,
            state: OrderState::from_str(&self.state).map_err(StoreError::Decode)?,
            maker: ChainAddress(self.maker),
            maker_dst_address: ChainAddress(self.maker_dst_address),
            receiver: ChainAddress(self.receiver),
            maker_asset: ChainAddress(self.maker_asset),
            taker_asset: ChainAddress(self.taker_asset),
            making_amount: bigdecimal_to_amount(&self.making_amount)?,
            taking_amount: bigdecimal_to_amount(&self.taking_amount)?,
            secret_hash: Digest32::from_hex(&self.secret_hash).map_err(|e| StoreError::Decode(e.to_string()))?,
            secret,
            deadline_src: self.deadline_src,
            deadline_dst: self.deadline_dst,
            src_escrow_address: self.src_escrow_address.map(EscrowRef),
            src_lock_tx_hash: self.src_lock_tx_hash.map(TxHash),
            src_withdraw_tx_hash: self.src_withdraw_tx_hash.map(TxHash),
            src_cancel_tx_hash: self.src_cancel_tx_hash.map(TxHash),
            dst_escrow_id: self.dst_escrow_id.map(EscrowRef),
            dst_lock_tx_hash: self.dst_lock_tx_hash.map(TxHash),
            dst_withdraw_tx_hash: self.dst_withdraw_tx_hash.map(TxHash),
            dst_cancel_tx_hash: self.dst_cancel_tx_hash.map(TxHash),
            auction_start: self.auction_start,
            auction_end: self.auction_end,
            start_rate: bigdecimal_to_amount(&self.start_rate)?,
            end_rate: bigdecimal_to_amount(&self.end_rate)?,
            auction_curve,
            original_order_bytes: self.original_order_bytes,
            signature: self.signature,
            created_at: self.created_at.timestamp(),
            updated_at: self.updated_at.timestamp(),
            error_message: self.error_message,
        })
    }
}

fn decode_secret(hex_str: &str) -> Result<[u8; 32], StoreError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| StoreError::Decode(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(StoreError::Decode("secret must be 32 bytes".into()));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
