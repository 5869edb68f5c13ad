use serde::{Deserialize, Serialize};

use crate::types::{Amount, ChainAddress, EscrowRef, OrderHash, OrderId, SecretHash, Timestamp, TxHash};

/// Lifecycle states of a `SwapOrder`. Names are stable for external
/// consumers — do not rename without a migration plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    New,
    AuctionStarted,
    EthLockPending,
    EthLocked,
    SuiLockPending,
    SuiLocked,
    ReadyForSecret,
    SecretReceived,
    Executed,
    CancelledDst,
    CancelledSrc,
    Refunded,
    Error,
}

impl OrderState {
    /// Terminal states never mutate again except `errorMessage`/`updatedAt`
    /// (invariant 3). `CancelledDst` is not terminal: destination-first
    /// cancellation ordering requires it to still fall through to
    /// `CancelledSrc` before the order is done.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Executed | OrderState::CancelledSrc | OrderState::Refunded | OrderState::Error
        )
    }

    /// Stable wire/storage name. Do not rename without a migration plan.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::New => "new",
            OrderState::AuctionStarted => "auction_started",
            OrderState::EthLockPending => "eth_lock_pending",
            OrderState::EthLocked => "eth_locked",
            OrderState::SuiLockPending => "sui_lock_pending",
            OrderState::SuiLocked => "sui_locked",
            OrderState::ReadyForSecret => "ready_for_secret",
            OrderState::SecretReceived => "secret_received",
            OrderState::Executed => "executed",
            OrderState::CancelledDst => "cancelled_dst",
            OrderState::CancelledSrc => "cancelled_src",
            OrderState::Refunded => "refunded",
            OrderState::Error => "error",
        }
    }

    /// States for which invariant 7 requires an armed (or persisted,
    /// unexecuted) timeout.
    pub fn requires_armed_timeout(self) -> bool {
        matches!(
            self,
            OrderState::EthLocked
                | OrderState::SuiLocked
                | OrderState::ReadyForSecret
                | OrderState::SecretReceived
        )
    }
}

impl std::str::FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "new" => OrderState::New,
            "auction_started" => OrderState::AuctionStarted,
            "eth_lock_pending" => OrderState::EthLockPending,
            "eth_locked" => OrderState::EthLocked,
            "sui_lock_pending" => OrderState::SuiLockPending,
            "sui_locked" => OrderState::SuiLocked,
            "ready_for_secret" => OrderState::ReadyForSecret,
            "secret_received" => OrderState::SecretReceived,
            "executed" => OrderState::Executed,
            "cancelled_dst" => OrderState::CancelledDst,
            "cancelled_src" => OrderState::CancelledSrc,
            "refunded" => OrderState::Refunded,
            "error" => OrderState::Error,
            other => return Err(format!("unknown order state: {other}")),
        })
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The allowed-transition table. `updateState` in the order store must
/// reject any `(from, to)` pair not listed here with `IllegalTransition`.
pub const ALLOWED_TRANSITIONS: &[(OrderState, OrderState)] = &[
    (OrderState::New, OrderState::AuctionStarted),
    (OrderState::AuctionStarted, OrderState::EthLockPending),
    (OrderState::EthLockPending, OrderState::EthLocked),
    (OrderState::EthLocked, OrderState::SuiLockPending),
    (OrderState::SuiLockPending, OrderState::SuiLocked),
    (OrderState::SuiLocked, OrderState::ReadyForSecret),
    (OrderState::ReadyForSecret, OrderState::SecretReceived),
    (OrderState::SecretReceived, OrderState::Executed),
    (OrderState::SuiLocked, OrderState::CancelledDst),
    (OrderState::ReadyForSecret, OrderState::CancelledDst),
    (OrderState::CancelledDst, OrderState::CancelledSrc),
    (OrderState::EthLocked, OrderState::CancelledSrc),
    // Any non-terminal state may fall to ERROR on a permanent chain error.
    (OrderState::New, OrderState::Error),
    (OrderState::AuctionStarted, OrderState::Error),
    (OrderState::EthLockPending, OrderState::Error),
    (OrderState::EthLocked, OrderState::Error),
    (OrderState::SuiLockPending, OrderState::Error),
    (OrderState::SuiLocked, OrderState::Error),
    (OrderState::ReadyForSecret, OrderState::Error),
    (OrderState::SecretReceived, OrderState::Error),
];

/// Returns `true` if `(from, to)` is a transition listed in `ALLOWED_TRANSITIONS`.
pub fn is_allowed_transition(from: OrderState, to: OrderState) -> bool {
    ALLOWED_TRANSITIONS.contains(&(from, to))
}

/// Which side of the auction's piecewise curve a point belongs to (see
/// relay-auction). Kept here because `SwapOrder` persists the curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionCurvePoint {
    /// Seconds offset from `auction_start`.
    pub time_offset_secs: i64,
    pub rate: Amount,
}

/// The durable, single per-user-intent record driven through the lifecycle
/// by the order coordinator, persisted by the durable order store.
/// Retained forever as audit trail — `SwapOrder` rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapOrder {
    pub id: OrderId,
    pub order_hash: OrderHash,
    pub state: OrderState,

    // Parties
    pub maker: ChainAddress,
    pub maker_dst_address: ChainAddress,
    pub receiver: ChainAddress,

    // Assets
    pub maker_asset: ChainAddress,
    pub taker_asset: ChainAddress,
    pub making_amount: Amount,
    pub taking_amount: Amount,

    // HTLC
    pub secret_hash: SecretHash,
    pub secret: Option<[u8; 32]>,

    // Timelocks
    pub deadline_src: Timestamp,
    pub deadline_dst: Timestamp,

    // Escrow refs
    pub src_escrow_address: Option<EscrowRef>,
    pub src_lock_tx_hash: Option<TxHash>,
    pub src_withdraw_tx_hash: Option<TxHash>,
    pub src_cancel_tx_hash: Option<TxHash>,
    pub dst_escrow_id: Option<EscrowRef>,
    pub dst_lock_tx_hash: Option<TxHash>,
    pub dst_withdraw_tx_hash: Option<TxHash>,
    pub dst_cancel_tx_hash: Option<TxHash>,

    // Auction
    pub auction_start: Timestamp,
    pub auction_end: Timestamp,
    pub start_rate: Amount,
    pub end_rate: Amount,
    pub auction_curve: Option<Vec<AuctionCurvePoint>>,

    // Audit
    pub original_order_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub error_message: Option<String>,
}

impl SwapOrder {
    /// Invariant 4: `secret` is non-null iff `state ∈ {SECRET_RECEIVED, EXECUTED}`.
    pub fn secret_presence_is_consistent(&self) -> bool {
        let expects_secret =
            matches!(self.state, OrderState::SecretReceived | OrderState::Executed);
        self.secret.is_some() == expects_secret
    }

    /// Invariant 8 (deadline ordering): `deadlineSrc > deadlineDst`.
    pub fn deadline_ordering_holds(&self) -> bool {
        self.deadline_src > self.deadline_dst
    }
}

/// Which side's timelock a `TimeoutEvent` guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutKind {
    SrcTimeout,
    DstTimeout,
}

/// Durable record of an armed deadline, so a relayer restart never loses a
/// timelock-triggered refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutEvent {
    pub id: i64,
    pub order_id: OrderId,
    pub kind: TimeoutKind,
    pub scheduled_at: Timestamp,
    pub executed_at: Option<Timestamp>,
    pub error_note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_chain_is_allowed() {
        let chain = [
            (OrderState::New, OrderState::AuctionStarted),
            (OrderState::AuctionStarted, OrderState::EthLockPending),
            (OrderState::EthLockPending, OrderState::EthLocked),
            (OrderState::EthLocked, OrderState::SuiLockPending),
            (OrderState::SuiLockPending, OrderState::SuiLocked),
            (OrderState::SuiLocked, OrderState::ReadyForSecret),
            (OrderState::ReadyForSecret, OrderState::SecretReceived),
            (OrderState::SecretReceived, OrderState::Executed),
        ];
        for (from, to) in chain {
            assert!(is_allowed_transition(from, to), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        assert!(!is_allowed_transition(OrderState::New, OrderState::EthLocked));
        assert!(!is_allowed_transition(
            OrderState::EthLockPending,
            OrderState::SuiLocked
        ));
    }

    #[test]
    fn terminal_states_never_transition_again() {
        for &state in &[
            OrderState::Executed,
            OrderState::CancelledSrc,
            OrderState::Refunded,
            OrderState::Error,
        ] {
            assert!(state.is_terminal());
            assert!(!ALLOWED_TRANSITIONS.iter().any(|&(from, _)| from == state));
        }
    }

    #[test]
    fn cancelled_dst_is_not_terminal_and_only_falls_to_cancelled_src() {
        assert!(!OrderState::CancelledDst.is_terminal());
        let outgoing: Vec<_> = ALLOWED_TRANSITIONS
            .iter()
            .filter(|&&(from, _)| from == OrderState::CancelledDst)
            .collect();
        assert_eq!(outgoing, vec![&(OrderState::CancelledDst, OrderState::CancelledSrc)]);
    }

    #[test]
    fn state_round_trips_through_its_wire_name() {
        use std::str::FromStr;
        for &state in &[
            OrderState::New,
            OrderState::AuctionStarted,
            OrderState::EthLockPending,
            OrderState::EthLocked,
            OrderState::SuiLockPending,
            OrderState::SuiLocked,
            OrderState::ReadyForSecret,
            OrderState::SecretReceived,
            OrderState::Executed,
            OrderState::CancelledDst,
            OrderState::CancelledSrc,
            OrderState::Refunded,
            OrderState::Error,
        ] {
            assert_eq!(OrderState::from_str(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn cancellation_branches_are_present() {
        assert!(is_allowed_transition(
            OrderState::SuiLocked,
            OrderState::CancelledDst
        ));
        assert!(is_allowed_transition(
            OrderState::ReadyForSecret,
            OrderState::CancelledDst
        ));
        assert!(is_allowed_transition(
            OrderState::CancelledDst,
            OrderState::CancelledSrc
        ));
        assert!(is_allowed_transition(
            OrderState::EthLocked,
            OrderState::CancelledSrc
        ));
    }
}
