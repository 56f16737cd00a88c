// =============================================================================
// Price Sequence Reconstruction
// =============================================================================
//
// Rebuilds the absolute price path close -> after-market -> pre-market from a
// closing price and two percentage moves, then derives the spreads between
// each pair of points.
//
// The pre-market percentage is relative to the after-market price, not to the
// close. Compounding is therefore order-sensitive:
//
//   after_price = close       * (1 + after / 100)
//   pre_price   = after_price * (1 + pre / 100)

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::InputError;
use crate::signals::validation::validate_closing_price;
use crate::types::round_to;

/// Lower bound on `total_movement`, keeps downstream divisions finite.
pub const MIN_TOTAL_MOVEMENT: f64 = 0.01;

/// Reconstructed price path for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadAnalysis {
    pub ticker: String,
    pub closing_price: f64,
    pub after_price: f64,
    pub pre_price: f64,
    /// Close -> after-market, in percent.
    pub after_spread_pct: f64,
    /// Close -> pre-market, in percent. Equals `after_spread_pct` without a
    /// pre-market reading.
    pub pre_spread_pct: f64,
    /// After-market -> pre-market, in percent. Zero without a pre-market
    /// reading.
    pub after_to_pre_spread_pct: f64,
    /// `|after_spread| + |after_to_pre_spread|`, floored at 0.01.
    pub total_movement: f64,
    pub has_pre_market: bool,
}

/// Reconstruct the price path for `ticker`.
///
/// Fails with `Unavailable` when the closing price is absent or zero and with
/// `InvalidInput` when it is negative or non-finite. Absent percentages count
/// as no movement, but `has_pre_market` only reflects an explicit pre-market
/// value.
pub fn reconstruct(
    ticker: &str,
    closing_price: Option<f64>,
    after_pct: Option<f64>,
    pre_pct: Option<f64>,
) -> Result<SpreadAnalysis, InputError> {
    let close = validate_closing_price(&format!("{ticker}.closing_price"), closing_price)?;

    let after_price = close * (1.0 + after_pct.unwrap_or(0.0) / 100.0);
    let pre_price = match pre_pct {
        Some(pre) => after_price * (1.0 + pre / 100.0),
        None => after_price,
    };

    let after_spread = (after_price - close) / close * 100.0;
    let (pre_spread, after_to_pre) = match pre_pct {
        Some(_) => (
            (pre_price - close) / close * 100.0,
            (pre_price - after_price) / after_price * 100.0,
        ),
        None => (after_spread, 0.0),
    };

    // after_pct == -100 collapses the after price to zero.
    if !(after_spread.is_finite() && pre_spread.is_finite() && after_to_pre.is_finite()) {
        return Err(InputError::invalid(
            format!("{ticker}.spread"),
            "reconstructed spread is not finite",
        ));
    }

    let after_spread_pct = round_to(after_spread, 4);
    let after_to_pre_spread_pct = round_to(after_to_pre, 4);
    let total_movement = round_to(after_spread_pct.abs() + after_to_pre_spread_pct.abs(), 4)
        .max(MIN_TOTAL_MOVEMENT);

    let analysis = SpreadAnalysis {
        ticker: ticker.to_string(),
        closing_price: round_to(close, 2),
        after_price: round_to(after_price, 2),
        pre_price: round_to(pre_price, 2),
        after_spread_pct,
        pre_spread_pct: round_to(pre_spread, 4),
        after_to_pre_spread_pct,
        total_movement,
        has_pre_market: pre_pct.is_some(),
    };

    trace!(
        ticker,
        after_spread = analysis.after_spread_pct,
        pre_spread = analysis.pre_spread_pct,
        after_to_pre = analysis.after_to_pre_spread_pct,
        total_movement = analysis.total_movement,
        "spread reconstructed"
    );

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compounds_pre_market_on_after_price() {
        let a = reconstruct("VALE", Some(100.0), Some(2.0), Some(3.0)).unwrap();
        assert!((a.after_price - 102.0).abs() < 1e-9);
        assert!((a.pre_price - 105.06).abs() < 1e-9);
        assert!((a.after_spread_pct - 2.0).abs() < 1e-9);
        assert!((a.pre_spread_pct - 5.06).abs() < 1e-9);
        assert!((a.after_to_pre_spread_pct - 3.0).abs() < 1e-9);
        assert!((a.total_movement - 5.0).abs() < 1e-9);
        assert!(a.has_pre_market);
    }

    #[test]
    fn swapping_the_session_order_changes_the_path() {
        let forward = reconstruct("VALE", Some(100.0), Some(2.0), Some(3.0)).unwrap();
        let swapped = reconstruct("VALE", Some(100.0), Some(3.0), Some(2.0)).unwrap();
        // Same end price, different intermediate path.
        assert!((forward.pre_price - swapped.pre_price).abs() < 1e-9);
        assert!((forward.after_price - swapped.after_price).abs() > 0.5);
        assert!((forward.after_to_pre_spread_pct - swapped.after_to_pre_spread_pct).abs() > 0.5);

        // Additive composition does not give the compounded result.
        let additive = 2.0 + 3.0;
        assert!((forward.pre_spread_pct - additive).abs() > 0.05);
    }

    #[test]
    fn missing_pre_market_mirrors_after_spread() {
        let a = reconstruct("ITUB", Some(30.0), Some(-1.5), None).unwrap();
        assert!(!a.has_pre_market);
        assert!((a.pre_spread_pct - a.after_spread_pct).abs() < 1e-12);
        assert!(a.after_to_pre_spread_pct.abs() < 1e-12);
        assert!((a.pre_price - a.after_price).abs() < 1e-12);
    }

    #[test]
    fn explicit_zero_pre_market_counts_as_present() {
        let a = reconstruct("ITUB", Some(30.0), Some(1.0), Some(0.0)).unwrap();
        assert!(a.has_pre_market);
    }

    #[test]
    fn total_movement_is_floored() {
        let a = reconstruct("PBR", Some(14.2), Some(0.0), Some(0.0)).unwrap();
        assert!((a.total_movement - MIN_TOTAL_MOVEMENT).abs() < 1e-12);

        let a = reconstruct("PBR", Some(14.2), None, None).unwrap();
        assert!(a.total_movement >= MIN_TOTAL_MOVEMENT);
    }

    #[test]
    fn total_movement_never_below_floor_for_small_moves() {
        for after in [-0.004, -0.001, 0.0, 0.002, 0.003] {
            for pre in [None, Some(0.0), Some(0.001), Some(-0.002)] {
                let a = reconstruct("BBD", Some(3.1), Some(after), pre).unwrap();
                assert!(a.total_movement >= MIN_TOTAL_MOVEMENT);
            }
        }
    }

    #[test]
    fn closing_price_failures() {
        assert!(matches!(
            reconstruct("BBD", None, Some(1.0), None),
            Err(InputError::Unavailable(_))
        ));
        assert!(matches!(
            reconstruct("BBD", Some(0.0), Some(1.0), None),
            Err(InputError::Unavailable(_))
        ));
        assert!(matches!(
            reconstruct("BBD", Some(-4.0), Some(1.0), None),
            Err(InputError::InvalidInput { .. })
        ));
    }

    #[test]
    fn after_collapse_is_invalid_not_infinite() {
        let r = reconstruct("ERJ", Some(40.0), Some(-100.0), Some(2.0));
        assert!(matches!(r, Err(InputError::InvalidInput { .. })));
    }

    #[test]
    fn outputs_are_rounded() {
        let a = reconstruct("VALE", Some(61.237), Some(1.23456), Some(-0.98765)).unwrap();
        assert!((a.closing_price - 61.24).abs() < 1e-9);
        for pct in [a.after_spread_pct, a.pre_spread_pct, a.after_to_pre_spread_pct] {
            let scaled = pct * 10_000.0;
            assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }
}
