//! Bid selection policy.
//!
//! Which resolver gets the fill when more than one is willing to take an
//! order is left pluggable behind a trait, with a simple default.

use relay_core::types::{Amount, ChainAddress, Timestamp};

/// A resolver's willingness to fill an order at a given rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bid {
    pub resolver: ChainAddress,
    pub rate: Amount,
    pub submitted_at: Timestamp,
}

/// Strategy for choosing among competing bids once the current Dutch-auction
/// rate makes more than one of them acceptable.
pub trait BidSelectionPolicy: Send + Sync {
    /// Returns the winning bid, if any bid meets `current_rate`.
    fn select<'b>(&self, bids: &'b [Bid], current_rate: Amount) -> Option<&'b Bid>;
}

/// Default policy: among bids at or above the current rate, the first one
/// submitted wins. Matches the intuition of a Dutch auction — the clock,
/// not the bid size, determines price, so ties go to whoever arrived first.
pub struct FirstAcceptableBid;

impl BidSelectionPolicy for FirstAcceptableBid {
    fn select<'b>(&self, bids: &'b [Bid], current_rate: Amount) -> Option<&'b Bid> {
        bids.iter()
            .filter(|b| b.rate >= current_rate)
            .min_by_key(|b| b.submitted_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> ChainAddress {
        ChainAddress(s.to_string())
    }

    #[test]
    fn picks_earliest_bid_meeting_the_current_rate() {
        let bids = vec![
            Bid { resolver: addr("0xaaa"), rate: Amount::from(900u64), submitted_at: 200 },
            Bid { resolver: addr("0xbbb"), rate: Amount::from(950u64), submitted_at: 100 },
        ];
        let winner = FirstAcceptableBid.select(&bids, Amount::from(900u64)).unwrap();
        assert_eq!(winner.resolver, addr("0xbbb"));
    }

    #[test]
    fn rejects_all_bids_below_current_rate() {
        let bids = vec![Bid { resolver: addr("0xaaa"), rate: Amount::from(400u64), submitted_at: 100 }];
        assert!(FirstAcceptableBid.select(&bids, Amount::from(900u64)).is_none());
    }

    #[test]
    fn empty_bid_list_selects_nothing() {
        assert!(FirstAcceptableBid.select(&[], Amount::from(900u64)).is_none());
    }
}
