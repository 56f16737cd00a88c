// =============================================================================
// Volatility-Index Sensitivity Policy
// =============================================================================
//
// Maps the volatility-index level onto a sensitivity ceiling and an asset
// price region, and bands the period change for the signal contribution.
//
//   level < 15        LOW      expensive   max 2.0
//   15 <= level < 30  NORMAL   neutral     max 1.5
//   30 <= level < 60  HIGH     cheap       max 1.2
//   level >= 60       EXTREME  extreme     max 0.8

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::Direction;

pub const MIN_SENSITIVITY: f64 = 0.1;
pub const MAX_SENSITIVITY: f64 = 2.0;

/// |change| at or above which the index move is considered relevant.
pub const RELEVANCE_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityStatus {
    Low,
    Normal,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRegion {
    Expensive,
    Neutral,
    Cheap,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityLimit {
    pub status: SensitivityStatus,
    pub region: PriceRegion,
    pub max_sensitivity: f64,
}

pub fn sensitivity_limit(level: f64) -> SensitivityLimit {
    let (status, region, max_sensitivity) = if level < 15.0 {
        (SensitivityStatus::Low, PriceRegion::Expensive, 2.0)
    } else if level < 30.0 {
        (SensitivityStatus::Normal, PriceRegion::Neutral, 1.5)
    } else if level < 60.0 {
        (SensitivityStatus::High, PriceRegion::Cheap, 1.2)
    } else {
        (SensitivityStatus::Extreme, PriceRegion::Extreme, 0.8)
    };
    SensitivityLimit {
        status,
        region,
        max_sensitivity,
    }
}

/// Sensitivity actually applied to the signal.
///
/// The manual value is clamped to [0.1, 2.0]; with auto-adjust on and a level
/// present it is further capped by the level's ceiling.
pub fn effective_sensitivity(manual: f64, auto_adjust: bool, level: Option<f64>) -> f64 {
    let base = if manual.is_finite() { manual } else { 1.0 };
    let mut sensitivity = base.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY);

    if auto_adjust {
        if let Some(level) = present_level(level) {
            let limit = sensitivity_limit(level);
            if sensitivity > limit.max_sensitivity {
                trace!(
                    manual = sensitivity,
                    cap = limit.max_sensitivity,
                    level,
                    "sensitivity capped by volatility index"
                );
                sensitivity = limit.max_sensitivity;
            }
        }
    }
    sensitivity
}

/// A usable level: finite and non-zero.
pub fn present_level(level: Option<f64>) -> Option<f64> {
    level.filter(|l| l.is_finite() && *l != 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VixRelevance {
    pub is_relevant: bool,
    /// Read for risk assets: a rising index is bearish.
    pub impact: Direction,
    pub change_pct: f64,
}

pub fn relevance(change_pct: f64) -> VixRelevance {
    let is_relevant = change_pct.abs() >= RELEVANCE_THRESHOLD;
    let impact = if !is_relevant {
        Direction::Neutral
    } else if change_pct > 0.0 {
        Direction::Bearish
    } else {
        Direction::Bullish
    };
    VixRelevance {
        is_relevant,
        impact,
        change_pct,
    }
}

/// Magnitude band applied to the index change in its signal contribution.
pub fn change_band_multiplier(change_pct: f64) -> f64 {
    let magnitude = change_pct.abs();
    if magnitude >= 5.0 {
        3.0
    } else if magnitude >= 3.0 {
        2.0
    } else if magnitude >= 1.0 {
        1.5
    } else {
        1.0
    }
}
