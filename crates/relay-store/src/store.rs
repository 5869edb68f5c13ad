//! Durable order store: Postgres-backed via `sqlx`, a connection-pool
//! wrapper around one relational schema. Every mutating method here
//! enforces the invariants the in-memory `relay_core::order` types only
//! describe: uniqueness, compare-and-set transitions, and set-once
//! escrow/secret fields.

use relay_core::order::{is_allowed_transition, OrderState, SwapOrder, TimeoutEvent, TimeoutKind};
use relay_core::secret::verify_secret;
use relay_core::types::{Amount, ChainAddress, EscrowRef, OrderHash};
use relay_core::RelayerError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::row::{amount_to_bigdecimal, SwapOrderRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order already exists: {0}")]
    Duplicate(String),

    #[error("illegal transition for order {order_hash}: {from:?} -> {to:?}")]
    IllegalTransition {
        order_hash: String,
        from: OrderState,
        to: OrderState,
    },

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("field already set and cannot be overwritten: {0}")]
    AlreadySet(&'static str),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StoreError> for RelayerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(order_hash) => RelayerError::DuplicateOrder { order_hash },
            StoreError::IllegalTransition { order_hash, from, to } => {
                RelayerError::IllegalTransition { order_hash, from, to }
            }
            other => RelayerError::Storage(other.to_string()),
        }
    }
}

/// Fields supplied by the coordinator when an order is first admitted, in
/// the `New` state. Everything derived later (escrow refs, secret,
/// timestamps) starts `NULL`.
pub struct NewOrder {
    pub order_hash: OrderHash,
    pub maker: ChainAddress,
    pub maker_dst_address: ChainAddress,
    pub receiver: ChainAddress,
    pub maker_asset: ChainAddress,
    pub taker_asset: ChainAddress,
    pub making_amount: Amount,
    pub taking_amount: Amount,
    pub secret_hash: relay_core::types::SecretHash,
    pub deadline_src: relay_core::types::Timestamp,
    pub deadline_dst: relay_core::types::Timestamp,
    pub auction_start: relay_core::types::Timestamp,
    pub auction_end: relay_core::types::Timestamp,
    pub start_rate: Amount,
    pub end_rate: Amount,
    pub original_order_bytes: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Clone)]
pub struct OrderStore {
    pool: PgPool,
}

impl OrderStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Invariant 1: `order_hash` is unique across all time.
    pub async fn create_order(&self, new: NewOrder) -> Result<SwapOrder, StoreError> {
        let order_hash_hex = new.order_hash.to_hex();
        let row = sqlx::query_as::<_, SwapOrderRow>(
            r#"
            INSERT INTO swap_orders (
                order_hash, state, maker, maker_dst_address, receiver,
                maker_asset, taker_asset, making_amount, taking_amount,
                secret_hash, deadline_src, deadline_dst,
                auction_start, auction_end, start_rate, end_rate,
                original_order_bytes, signature
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(new.order_hash.to_hex())
        .bind(OrderState::New.as_str())
        .bind(new.maker.0)
        .bind(new.maker_dst_address.0)
        .bind(new.receiver.0)
        .bind(new.maker_asset.0)
        .bind(new.taker_asset.0)
        .bind(amount_to_bigdecimal(new.making_amount))
        .bind(amount_to_bigdecimal(new.taking_amount))
        .bind(new.secret_hash.to_hex())
        .bind(new.deadline_src)
        .bind(new.deadline_dst)
        .bind(new.auction_start)
        .bind(new.auction_end)
        .bind(amount_to_bigdecimal(new.start_rate))
        .bind(amount_to_bigdecimal(new.end_rate))
        .bind(new.original_order_bytes)
        .bind(new.signature)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(order_hash_hex.clone())
            }
            _ => StoreError::Database(e),
        })?;
        row.into_domain()
    }

    pub async fn get_by_hash(&self, order_hash: &OrderHash) -> Result<Option<SwapOrder>, StoreError> {
        let row = sqlx::query_as::<_, SwapOrderRow>("SELECT * FROM swap_orders WHERE order_hash = $1")
            .bind(order_hash.to_hex())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SwapOrderRow::into_domain).transpose()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SwapOrder>, StoreError> {
        let row = sqlx::query_as::<_, SwapOrderRow>("SELECT * FROM swap_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SwapOrderRow::into_domain).transpose()
    }

    /// Compare-and-set transition: fails closed if `from -> to` is not in
    /// `ALLOWED_TRANSITIONS`, and fails with a stale-state error if another
    /// writer already moved the row off `from` (invariant 2, no lost updates).
    pub async fn update_state(&self, id: i64, from: OrderState, to: OrderState) -> Result<SwapOrder, StoreError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if !is_allowed_transition(from, to) {
            return Err(StoreError::IllegalTransition {
                order_hash: current.order_hash.to_hex(),
                from,
                to,
            });
        }

        let row = sqlx::query_as::<_, SwapOrderRow>(
            "UPDATE swap_orders SET state = $1, updated_at = now() WHERE id = $2 AND state = $3 RETURNING *",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => r.into_domain(),
            None => Err(StoreError::IllegalTransition {
                order_hash: current.order_hash.to_hex(),
                from: current.state,
                to,
            }),
        }
    }

    /// Set-once: only writes if the column is currently `NULL`.
    pub async fn attach_src_escrow(&self, id: i64, escrow: &EscrowRef, lock_tx: &relay_core::types::TxHash) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE swap_orders SET src_escrow_address = $1, src_lock_tx_hash = $2, updated_at = now() \
             WHERE id = $3 AND src_escrow_address IS NULL",
        )
        .bind(&escrow.0)
        .bind(&lock_tx.0)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::AlreadySet("src_escrow_address"));
        }
        Ok(())
    }

    pub async fn attach_dst_escrow(&self, id: i64, escrow: &EscrowRef, lock_tx: &relay_core::types::TxHash) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE swap_orders SET dst_escrow_id = $1, dst_lock_tx_hash = $2, updated_at = now() \
             WHERE id = $3 AND dst_escrow_id IS NULL",
        )
        .bind(&escrow.0)
        .bind(&lock_tx.0)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::AlreadySet("dst_escrow_id"));
        }
        Ok(())
    }

    pub async fn attach_src_withdraw_tx(&self, id: i64, tx: &relay_core::types::TxHash) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE swap_orders SET src_withdraw_tx_hash = $1, updated_at = now() \
             WHERE id = $2 AND src_withdraw_tx_hash IS NULL",
        )
        .bind(&tx.0)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StoreError::AlreadySet("src_withdraw_tx_hash"));
        }
        Ok(())
    }

    pub async fn attach_dst_withdraw_tx(&self, id: i64, tx: &relay_core::types::TxHash) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE swap_orders SET dst_withdraw_tx_hash = $1, updated_at = now() \
             WHERE id = $2 AND dst_withdraw_tx_hash IS NULL",
        )
        .bind(&tx.0)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StoreError::AlreadySet("dst_withdraw_tx_hash"));
        }
        Ok(())
    }

    pub async fn attach_src_cancel_tx(&self, id: i64, tx: &relay_core::types::TxHash) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE swap_orders SET src_cancel_tx_hash = $1, updated_at = now() \
             WHERE id = $2 AND src_cancel_tx_hash IS NULL",
        )
        .bind(&tx.0)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StoreError::AlreadySet("src_cancel_tx_hash"));
        }
        Ok(())
    }

    pub async fn attach_dst_cancel_tx(&self, id: i64, tx: &relay_core::types::TxHash) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE swap_orders SET dst_cancel_tx_hash = $1, updated_at = now() \
             WHERE id = $2 AND dst_cancel_tx_hash IS NULL",
        )
        .bind(&tx.0)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StoreError::AlreadySet("dst_cancel_tx_hash"));
        }
        Ok(())
    }

    /// Invariant 4/5: the secret is written exactly once, only after it has
    /// been verified against the order's committed `secret_hash`, and the
    /// state transitions to `SecretReceived` in the same statement.
    pub async fn record_secret(&self, id: i64, secret: [u8; 32]) -> Result<SwapOrder, StoreError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if current.secret.is_some() {
            return Err(StoreError::AlreadySet("secret"));
        }
        if !verify_secret(&secret, &current.secret_hash) {
            return Err(StoreError::Decode("secret does not hash to the committed secret_hash".into()));
        }
        if !is_allowed_transition(current.state, OrderState::SecretReceived) {
            return Err(StoreError::IllegalTransition {
                order_hash: current.order_hash.to_hex(),
                from: current.state,
                to: OrderState::SecretReceived,
            });
        }

        let row = sqlx::query_as::<_, SwapOrderRow>(
            "UPDATE swap_orders SET secret = $1, state = $2, updated_at = now() \
             WHERE id = $3 AND secret IS NULL AND state = $4 RETURNING *",
        )
        .bind(hex::encode(secret))
        .bind(OrderState::SecretReceived.as_str())
        .bind(id)
        .bind(current.state.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => r.into_domain(),
            None => Err(StoreError::AlreadySet("secret")),
        }
    }

    pub async fn set_error_message(&self, id: i64, message: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE swap_orders SET error_message = $1, updated_at = now() WHERE id = $2")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_active(&self) -> Result<Vec<SwapOrder>, StoreError> {
        let rows = sqlx::query_as::<_, SwapOrderRow>(
            "SELECT * FROM swap_orders WHERE state NOT IN ($1, $2, $3, $4) ORDER BY id",
        )
        .bind(OrderState::Executed.as_str())
        .bind(OrderState::CancelledSrc.as_str())
        .bind(OrderState::Refunded.as_str())
        .bind(OrderState::Error.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SwapOrderRow::into_domain).collect()
    }

    pub async fn list_by_maker(&self, maker: &ChainAddress) -> Result<Vec<SwapOrder>, StoreError> {
        let rows = sqlx::query_as::<_, SwapOrderRow>("SELECT * FROM swap_orders WHERE maker = $1 ORDER BY id")
            .bind(&maker.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SwapOrderRow::into_domain).collect()
    }

    // ── Scheduler durability ─────────────────────────────────────────────────

    pub async fn arm_timeout(&self, order_id: i64, kind: TimeoutKind, scheduled_at: i64) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO timeout_events (order_id, kind, scheduled_at) VALUES ($1, $2, $3) \
             ON CONFLICT (order_id, kind) DO UPDATE SET scheduled_at = EXCLUDED.scheduled_at \
             RETURNING id",
        )
        .bind(order_id)
        .bind(kind_as_str(kind))
        .bind(scheduled_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn mark_timeout_executed(
        &self,
        id: i64,
        executed_at: relay_core::types::Timestamp,
        error_note: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE timeout_events SET executed_at = $1, error_note = $2 WHERE id = $3")
            .bind(executed_at)
            .bind(error_note)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Startup recovery: every unexecuted timeout, oldest first, so a
    /// restart rehydrates the scheduler's priority queue in fire order.
    pub async fn list_unexecuted_timeouts(&self) -> Result<Vec<TimeoutEvent>, StoreError> {
        let rows: Vec<(i64, i64, String, i64, Option<i64>, Option<String>)> = sqlx::query_as(
            "SELECT id, order_id, kind, scheduled_at, executed_at, error_note \
             FROM timeout_events WHERE executed_at IS NULL ORDER BY scheduled_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, order_id, kind, scheduled_at, executed_at, error_note)| {
                Ok(TimeoutEvent {
                    id,
                    order_id,
                    kind: kind_from_str(&kind)?,
                    scheduled_at,
                    executed_at,
                    error_note,
                })
            })
            .collect()
    }
}

fn kind_as_str(kind: TimeoutKind) -> &'static str {
    match kind {
        TimeoutKind::SrcTimeout => "src_timeout",
        TimeoutKind::DstTimeout => "dst_timeout",
    }
}

fn kind_from_str(s: &str) -> Result<TimeoutKind, StoreError> {
    match s {
        "src_timeout" => Ok(TimeoutKind::SrcTimeout),
        "dst_timeout" => Ok(TimeoutKind::DstTimeout),
        other => Err(StoreError::Decode(format!("unknown timeout kind: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_kind_round_trips() {
        assert_eq!(kind_from_str(kind_as_str(TimeoutKind::SrcTimeout)).unwrap(), TimeoutKind::SrcTimeout);
        assert_eq!(kind_from_str(kind_as_str(TimeoutKind::DstTimeout)).unwrap(), TimeoutKind::DstTimeout);
    }
}
