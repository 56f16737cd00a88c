// =============================================================================
// Information Ratio Weighting
// =============================================================================
//
// Dynamic per-instrument weight from the ratio of the instrument's active
// return (close -> pre spread against a zero benchmark) to a tracking-error
// proxy (the after -> pre spread magnitude).
//
//   weight = clamp(1 + 0.3 * ratio, 0.5, 2.0)

use serde::{Deserialize, Serialize};

use crate::spread::reconstruct::SpreadAnalysis;

const BENCHMARK: f64 = 0.0;
const RATIO_SCALE: f64 = 0.3;
pub const MIN_IR_WEIGHT: f64 = 0.5;
pub const MAX_IR_WEIGHT: f64 = 2.0;

/// Weight used for instruments without a spread analysis.
pub const NEUTRAL_IR_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioQuality {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InformationRatio {
    pub ratio: f64,
    pub active_return: f64,
    pub tracking_error: f64,
    pub dynamic_weight: f64,
    pub quality: RatioQuality,
}

pub fn compute(analysis: &SpreadAnalysis) -> InformationRatio {
    let active_return = analysis.pre_spread_pct - BENCHMARK;

    let raw_error = analysis.after_to_pre_spread_pct.abs();
    let tracking_error = if raw_error.is_finite() && raw_error > f64::EPSILON {
        raw_error
    } else {
        1.0
    };

    let mut ratio = active_return / tracking_error;
    if !ratio.is_finite() {
        ratio = 0.0;
    }

    let dynamic_weight = (1.0 + ratio * RATIO_SCALE).clamp(MIN_IR_WEIGHT, MAX_IR_WEIGHT);

    let quality = if ratio > 0.5 {
        RatioQuality::High
    } else if ratio > 0.0 {
        RatioQuality::Medium
    } else {
        RatioQuality::Low
    };

    InformationRatio {
        ratio,
        active_return,
        tracking_error,
        dynamic_weight,
        quality,
    }
}

/// Cross-instrument tally of the ratios computed in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InformationRatioSummary {
    pub total: usize,
    pub valid: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub avg_ratio: f64,
}

impl InformationRatioSummary {
    /// `ratios` holds one entry per selected instrument, `None` where no
    /// analysis was available.
    pub fn from_ratios<'a>(ratios: impl IntoIterator<Item = Option<&'a InformationRatio>>) -> Self {
        let mut summary = Self::default();
        let mut sum = 0.0;
        for ir in ratios {
            summary.total += 1;
            let Some(ir) = ir else { continue };
            summary.valid += 1;
            sum += ir.ratio;
            match ir.quality {
                RatioQuality::High => summary.high += 1,
                RatioQuality::Medium => summary.medium += 1,
                RatioQuality::Low => summary.low += 1,
            }
        }
        if summary.valid > 0 {
            summary.avg_ratio = sum / summary.valid as f64;
        }
        summary
    }
}
