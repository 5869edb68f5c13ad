//! Dutch-auction rate function.
//!
//! Integer-only, windowed-ratio arithmetic (no floats, clamped,
//! deterministic given the same inputs): piecewise-linear interpolation
//! across a curve, or a straight line between `start_rate` and `end_rate`
//! when no curve is configured.

use relay_core::order::AuctionCurvePoint;
use relay_core::types::{Amount, Timestamp};

/// The rate a taker would receive if they filled the order at `now`.
/// Flat at `start_rate` before the auction opens, flat at `end_rate` once
/// it closes, otherwise interpolated — piecewise over `curve` when one is
/// configured, linear between the two endpoints otherwise.
pub fn current_rate(
    now: Timestamp,
    auction_start: Timestamp,
    auction_end: Timestamp,
    start_rate: Amount,
    end_rate: Amount,
    curve: Option<&[AuctionCurvePoint]>,
) -> Amount {
    if now <= auction_start {
        return start_rate;
    }
    if now >= auction_end {
        return end_rate;
    }

    match curve {
        Some(points) if !points.is_empty() => interpolate_curve(now - auction_start, points, start_rate, end_rate),
        _ => interpolate_linear(now - auction_start, auction_end - auction_start, start_rate, end_rate),
    }
}

fn interpolate_linear(elapsed_secs: i64, total_secs: i64, start_rate: Amount, end_rate: Amount) -> Amount {
    if total_secs <= 0 {
        return end_rate;
    }
    let elapsed = Amount::from(elapsed_secs as u64);
    let total = Amount::from(total_secs as u64);
    if start_rate >= end_rate {
        let delta = start_rate - end_rate;
        start_rate - (delta * elapsed / total)
    } else {
        let delta = end_rate - start_rate;
        start_rate + (delta * elapsed / total)
    }
}

/// Interpolate across a piecewise curve of `(time_offset_secs, rate)`
/// points. Before the first point, the rate is `start_rate`; after the
/// last, `end_rate`; the caller has already excluded `now` outside
/// `[auction_start, auction_end]`.
fn interpolate_curve(elapsed_secs: i64, points: &[AuctionCurvePoint], start_rate: Amount, end_rate: Amount) -> Amount {
    if elapsed_secs <= points[0].time_offset_secs {
        return if elapsed_secs == points[0].time_offset_secs {
            points[0].rate
        } else {
            start_rate
        };
    }

    let last = points.last().expect("checked non-empty above");
    if elapsed_secs >= last.time_offset_secs {
        return if elapsed_secs == last.time_offset_secs { last.rate } else { end_rate };
    }

    for window in points.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        if elapsed_secs >= a.time_offset_secs && elapsed_secs <= b.time_offset_secs {
            let segment_secs = b.time_offset_secs - a.time_offset_secs;
            if segment_secs == 0 {
                return a.rate;
            }
            return interpolate_linear(elapsed_secs - a.time_offset_secs, segment_secs, a.rate, b.rate);
        }
    }

    // Unreachable given sorted, bracketing points, but fail safe rather
    // than panic on a malformed curve.
    end_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_before_and_after_the_window() {
        let start_rate = Amount::from(1_000u64);
        let end_rate = Amount::from(500u64);
        assert_eq!(current_rate(0, 100, 200, start_rate, end_rate, None), start_rate);
        assert_eq!(current_rate(300, 100, 200, start_rate, end_rate, None), end_rate);
    }

    #[test]
    fn linear_midpoint_is_the_average() {
        let start_rate = Amount::from(1_000u64);
        let end_rate = Amount::from(500u64);
        let mid = current_rate(150, 100, 200, start_rate, end_rate, None);
        assert_eq!(mid, Amount::from(750u64));
    }

    #[test]
    fn increasing_rate_curve_interpolates_upward() {
        let start_rate = Amount::from(500u64);
        let end_rate = Amount::from(1_000u64);
        let mid = current_rate(150, 100, 200, start_rate, end_rate, None);
        assert_eq!(mid, Amount::from(750u64));
    }

    #[test]
    fn piecewise_curve_interpolates_within_its_own_segment() {
        let curve = vec![
            AuctionCurvePoint { time_offset_secs: 0, rate: Amount::from(1_000u64) },
            AuctionCurvePoint { time_offset_secs: 50, rate: Amount::from(900u64) },
            AuctionCurvePoint { time_offset_secs: 100, rate: Amount::from(500u64) },
        ];
        let start_rate = Amount::from(1_000u64);
        let end_rate = Amount::from(500u64);
        let at_25 = current_rate(125, 100, 200, start_rate, end_rate, Some(&curve));
        assert_eq!(at_25, Amount::from(950u64));
    }

    #[test]
    fn degenerate_zero_length_window_returns_start_rate() {
        // auction_start == auction_end == now: the "before start" check
        // takes priority, so the window never actually opens.
        let start_rate = Amount::from(1_000u64);
        let end_rate = Amount::from(500u64);
        assert_eq!(current_rate(100, 100, 100, start_rate, end_rate, None), start_rate);
    }
}
