pub mod row;
pub mod store;

pub use store::{NewOrder, OrderStore, StoreError};
