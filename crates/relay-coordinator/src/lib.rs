pub mod coordinator;
pub mod order_hash;
pub mod refund;
pub mod shutdown;

pub use coordinator::{OrderCoordinator, OrderIntake};
pub use order_hash::{compute_order_hash, OrderHashInput};
pub use refund::RefundHandler;
pub use shutdown::Shutdown;
