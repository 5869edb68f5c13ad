pub mod adapter;
pub mod evm;
pub mod mock;
pub mod object_chain;
pub mod signing;

pub use adapter::{
    CancelReceipt, ChainAdapter, ChainEvent, ChainEventKind, LockReceipt, UnlockReceipt, WatchCursor,
};
pub use evm::{EvmAdapter, EvmConfig};
pub use mock::MockAdapter;
pub use object_chain::{ObjectChainAdapter, ObjectChainConfig};
