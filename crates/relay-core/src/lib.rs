pub mod backoff;
pub mod constants;
pub mod error;
pub mod order;
pub mod secret;
pub mod types;

pub use backoff::BackoffSchedule;
pub use constants::*;
pub use error::RelayerError;
pub use order::{OrderState, SwapOrder, TimeoutEvent, TimeoutKind, ALLOWED_TRANSITIONS};
pub use types::*;
