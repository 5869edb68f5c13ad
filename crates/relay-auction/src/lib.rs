pub mod bid;
pub mod rate;

pub use bid::{Bid, BidSelectionPolicy, FirstAcceptableBid};
pub use rate::current_rate;
