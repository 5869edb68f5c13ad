use thiserror::Error;

use crate::order::OrderState;

/// The closed set of error kinds the coordinator and its collaborators can
/// raise. Distinguishable without string matching, per the error-handling
/// contract: `ValidationError`/`DuplicateOrder`/`SecretMismatch` surface to
/// the order-intake boundary; everything else is recovered locally (retried,
/// re-armed, re-read) and never escapes the process.
#[derive(Debug, Error)]
pub enum RelayerError {
    // ── Boundary errors (rooted in user input) ───────────────────────────────
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("order already exists: {order_hash}")]
    DuplicateOrder { order_hash: String },

    #[error("preimage does not hash to the committed secret hash")]
    SecretMismatch,

    // ── State-machine errors ──────────────────────────────────────────────────
    #[error("illegal transition for order {order_hash}: {from:?} -> {to:?}")]
    IllegalTransition {
        order_hash: String,
        from: OrderState,
        to: OrderState,
    },

    // ── Chain-adapter errors ──────────────────────────────────────────────────
    #[error("transient chain error on {chain}: {message}")]
    TransientChainError { chain: String, message: String },

    #[error("permanent chain error on {chain}: {message}")]
    PermanentChainError { chain: String, message: String },

    #[error("operation on {chain} exceeded its deadline after {elapsed_ms}ms")]
    DeadlineExceeded { chain: String, elapsed_ms: u64 },

    // ── Storage ────────────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Catch-all ──────────────────────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    /// True for errors that a caller should retry (with backoff) rather than
    /// treat as fatal to the order.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayerError::TransientChainError { .. } | RelayerError::DeadlineExceeded { .. }
        )
    }

    /// True for errors rooted in user input that must surface at the order
    /// intake / secret intake boundary rather than mutate persisted state.
    pub fn is_boundary_error(&self) -> bool {
        matches!(
            self,
            RelayerError::ValidationError(_)
                | RelayerError::DuplicateOrder { .. }
                | RelayerError::SecretMismatch
        )
    }
}
