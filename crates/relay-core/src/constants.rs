//! ─── Relayer Coordinator constants ──────────────────────────────────────────
//!
//! Numeric defaults are authoritative per spec; these are overridable via
//! `RelayerConfig` (environment variables), never hardcoded into the state
//! machine itself.

use crate::types::Timestamp;

/// Fixed-point scale used by the Dutch-auction interpolation (relay-auction).
/// All intermediate rate scaling is done at this denominator to avoid float
/// drift; the final result is always an integer `Amount`.
pub const AUCTION_RATE_SCALE: u128 = 1_000_000_000_000_000_000; // 1e18

/// Minimum auction window width (seconds).
pub const AUCTION_WINDOW_MIN_SECS: i64 = 60;

/// Maximum auction window width (seconds).
pub const AUCTION_WINDOW_MAX_SECS: i64 = 86_400;

/// Default offset (from order acceptance) at which the source-chain
/// timelock expires, in seconds. Authoritative — see spec's Open Questions.
pub const DEFAULT_SRC_TIMEOUT_OFFSET_SECS: i64 = 420;

/// Default offset at which the destination-chain timelock expires, in
/// seconds. Authoritative — see spec's Open Questions.
pub const DEFAULT_DST_TIMEOUT_OFFSET_SECS: i64 = 180;

/// Minimum gap enforced between `deadlineDst` and `deadlineSrc` beyond the
/// two finality margins (invariant 6): `deadlineSrc` must leave the resolver
/// enough room, after the destination expires, to react before the source
/// also expires.
pub const MIN_SRC_DST_TIMEOUT_GAP_SECS: i64 = 30;

/// Default number of coordinator tasks allowed to be simultaneously in a
/// `*_PENDING` chain call.
pub const DEFAULT_MAX_CONCURRENT_ORDERS: usize = 100;

/// Default bounded-channel capacity for watcher-to-coordinator event fan-out.
pub const DEFAULT_EVENT_WATCHER_BUFFER_SIZE: usize = 256;

/// Default per-RPC-call timeout for chain adapter operations (seconds).
pub const DEFAULT_CHAIN_CALL_TIMEOUT_SECS: u64 = 30;

/// Default grace period after shutdown signal before in-flight chain calls
/// are abandoned (seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Default scheduler poll precision target (seconds) — deadlines fire within
/// this long of `fireAt`.
pub const SCHEDULER_PRECISION_TARGET_SECS: i64 = 1;

/// Default retry backoff base (seconds).
pub const DEFAULT_RETRY_BASE_SECS: u64 = 1;

/// Default retry backoff factor.
pub const DEFAULT_RETRY_FACTOR: u32 = 2;

/// Default maximum retry attempts for a transient chain error.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// Returns `true` if `deadline_src` and `deadline_dst` satisfy invariant 6:
/// `deadlineSrc > deadlineDst + finality_margin_src + finality_margin_dst`.
pub fn deadlines_respect_ordering(
    deadline_src: Timestamp,
    deadline_dst: Timestamp,
    finality_margin_src: Timestamp,
    finality_margin_dst: Timestamp,
) -> bool {
    deadline_src > deadline_dst + finality_margin_src + finality_margin_dst
}
