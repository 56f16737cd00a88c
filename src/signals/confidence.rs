// =============================================================================
// Confidence Scorer
// =============================================================================
//
// Additive blend, clamped to [0, 100] and rounded:
//
//   coverage      min(1, primary effective weight / primary index weight) * 40
//   validation    (confirmed + 0.7 weakened + 0.4 diverged) / validated * 25
//   macro         indicators with data / indicators * 15
//   vix data      +10 when both level and change are present
//   vix status    -10 extreme, +5 low (auto-adjust only)
//   extreme move  -10 when |primary contribution| > 0.5

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::regime::vix::{present_level, sensitivity_limit, SensitivityStatus};
use crate::regime::volatility::VolatilityRegimeState;
use crate::signals::aggregator::AggregationResult;
use crate::types::VolatilityIndexObservation;

const COVERAGE_POINTS: f64 = 40.0;
const VALIDATION_POINTS: f64 = 25.0;
const MACRO_POINTS: f64 = 15.0;
const VIX_DATA_BONUS: f64 = 10.0;
const VIX_EXTREME_PENALTY: f64 = -10.0;
const VIX_LOW_BONUS: f64 = 5.0;
const EXTREME_MOVE_PENALTY: f64 = -10.0;
const EXTREME_MOVE_THRESHOLD: f64 = 0.5;

const WEAKENED_QUALITY: f64 = 0.7;
const DIVERGED_QUALITY: f64 = 0.4;

/// Individual terms before summation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTerms {
    pub coverage: f64,
    pub validation: f64,
    pub macro_completeness: f64,
    pub vix_data: f64,
    pub vix_status: f64,
    pub extreme_move: f64,
}

impl ConfidenceTerms {
    pub fn total(&self) -> f64 {
        self.coverage
            + self.validation
            + self.macro_completeness
            + self.vix_data
            + self.vix_status
            + self.extreme_move
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub value: u8,
    pub terms: ConfidenceTerms,
}

pub struct ConfidenceScorer {
    auto_adjust: bool,
}

impl ConfidenceScorer {
    pub fn new(auto_adjust: bool) -> Self {
        Self { auto_adjust }
    }

    pub fn score(
        &self,
        agg: &AggregationResult,
        regime: &VolatilityRegimeState,
        vix: &VolatilityIndexObservation,
    ) -> ConfidenceScore {
        let mut terms = ConfidenceTerms::default();

        if agg.primary_index_weight > 0.0 {
            let coverage = (agg.breakdown.primary.weight / agg.primary_index_weight).min(1.0);
            terms.coverage = coverage * COVERAGE_POINTS;
        }

        let stats = &agg.validation;
        let validated = stats.validated();
        if validated > 0 {
            let quality = (f64::from(stats.confirmed)
                + f64::from(stats.weakened) * WEAKENED_QUALITY
                + f64::from(stats.diverged) * DIVERGED_QUALITY)
                / f64::from(validated);
            terms.validation = quality * VALIDATION_POINTS;
        }

        if agg.macro_total > 0 {
            terms.macro_completeness = f64::from(agg.breakdown.macro_indicators.count)
                / agg.macro_total as f64
                * MACRO_POINTS;
        }

        if vix.has_level() && vix.has_change() {
            terms.vix_data = VIX_DATA_BONUS;
        }

        if self.auto_adjust {
            if let Some(level) = present_level(vix.level) {
                terms.vix_status = match sensitivity_limit(level).status {
                    SensitivityStatus::Extreme => VIX_EXTREME_PENALTY,
                    SensitivityStatus::Low => VIX_LOW_BONUS,
                    _ => 0.0,
                };
            }
        }

        if agg.breakdown.primary.contribution.abs() > EXTREME_MOVE_THRESHOLD {
            terms.extreme_move = EXTREME_MOVE_PENALTY;
        }

        let raw = terms.total();
        let value = if raw.is_finite() {
            raw.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };

        debug!(
            confidence = value,
            coverage = format!("{:.2}", terms.coverage),
            validation = format!("{:.2}", terms.validation),
            macro_ = format!("{:.2}", terms.macro_completeness),
            vix_data = terms.vix_data,
            vix_status = terms.vix_status,
            extreme_move = terms.extreme_move,
            regime = %regime.regime,
            "confidence scored"
        );

        ConfidenceScore { value, terms }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::aggregator::{Breakdown, BucketContribution, ValidationStats};

    fn agg(primary_weight: f64, primary_contribution: f64) -> AggregationResult {
        AggregationResult {
            signal: primary_contribution,
            breakdown: Breakdown {
                primary: BucketContribution {
                    contribution: primary_contribution,
                    weight: primary_weight,
                    count: 1,
                },
                ..Breakdown::default()
            },
            validation: ValidationStats::default(),
            instruments: Vec::new(),
            macro_contributions: Vec::new(),
            primary_index_weight: 34.741,
            macro_total: 7,
            issues: Vec::new(),
        }
    }

    fn regime() -> VolatilityRegimeState {
        VolatilityRegimeState::neutral(20.0)
    }

    #[test]
    fn full_coverage_and_confirmed_validation() {
        let mut a = agg(34.741, 0.2);
        a.validation.confirmed = 4;
        a.breakdown.macro_indicators.count = 7;
        let vix = VolatilityIndexObservation::new(Some(20.0), Some(2.0));
        let s = ConfidenceScorer::new(true).score(&a, &regime(), &vix);
        // 40 + 25 + 15 + 10, normal status
        assert_eq!(s.value, 90);
        assert!((s.terms.coverage - 40.0).abs() < 1e-9);
        assert!((s.terms.validation - 25.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_is_capped_at_one() {
        let a = agg(70.0, 0.1);
        let s = ConfidenceScorer::new(false).score(&a, &regime(), &VolatilityIndexObservation::default());
        assert!((s.terms.coverage - 40.0).abs() < 1e-9);
    }

    #[test]
    fn validation_quality_weights() {
        let mut a = agg(0.0, 0.0);
        a.validation.confirmed = 1;
        a.validation.weakened = 1;
        a.validation.diverged = 2;
        let s = ConfidenceScorer::new(false).score(&a, &regime(), &VolatilityIndexObservation::default());
        let expected = (1.0 + 0.7 + 0.8) / 4.0 * 25.0;
        assert!((s.terms.validation - expected).abs() < 1e-9);
        assert_eq!(s.value, expected.round() as u8);
    }

    #[test]
    fn volatility_index_status_adjustment() {
        let a = agg(0.0, 0.0);
        let low = VolatilityIndexObservation::new(Some(12.0), None);
        let s = ConfidenceScorer::new(true).score(&a, &regime(), &low);
        assert!((s.terms.vix_status - 5.0).abs() < 1e-12);
        assert!(s.terms.vix_data.abs() < 1e-12);

        let extreme = VolatilityIndexObservation::new(Some(65.0), Some(8.0));
        let s = ConfidenceScorer::new(true).score(&a, &regime(), &extreme);
        assert!((s.terms.vix_status + 10.0).abs() < 1e-12);

        let s = ConfidenceScorer::new(false).score(&a, &regime(), &extreme);
        assert!(s.terms.vix_status.abs() < 1e-12);
    }

    #[test]
    fn extreme_primary_move_is_penalised() {
        let a = agg(34.741, 0.6);
        let s = ConfidenceScorer::new(false).score(&a, &regime(), &VolatilityIndexObservation::default());
        assert!((s.terms.extreme_move + 10.0).abs() < 1e-12);
        assert_eq!(s.value, 30);

        let a = agg(34.741, -0.6);
        let s = ConfidenceScorer::new(false).score(&a, &regime(), &VolatilityIndexObservation::default());
        assert_eq!(s.value, 30);
    }

    #[test]
    fn score_is_clamped_to_bounds() {
        // Only penalties: raw total is negative.
        let a = agg(0.0, 0.9);
        let extreme = VolatilityIndexObservation::new(Some(70.0), None);
        let s = ConfidenceScorer::new(true).score(&a, &regime(), &extreme);
        assert!(s.terms.total() < 0.0);
        assert_eq!(s.value, 0);

        // Every bonus at once.
        let mut a = agg(34.741, 0.1);
        a.validation.confirmed = 6;
        a.breakdown.macro_indicators.count = 7;
        let low = VolatilityIndexObservation::new(Some(11.0), Some(3.0));
        let s = ConfidenceScorer::new(true).score(&a, &regime(), &low);
        assert_eq!(s.value, 95);
    }

    #[test]
    fn score_stays_in_range_over_a_grid() {
        for weight in [0.0, 5.0, 20.0, 34.741, 80.0] {
            for contribution in [-1.0, -0.3, 0.0, 0.4, 2.0] {
                for (c, w, d) in [(0, 0, 0), (3, 0, 0), (0, 2, 5), (1, 1, 1)] {
                    for level in [None, Some(10.0), Some(25.0), Some(75.0)] {
                        let mut a = agg(weight, contribution);
                        a.validation.confirmed = c;
                        a.validation.weakened = w;
                        a.validation.diverged = d;
                        let vix = VolatilityIndexObservation::new(level, Some(4.0));
                        let s = ConfidenceScorer::new(true).score(&a, &regime(), &vix);
                        let expected = s.terms.total().round().clamp(0.0, 100.0);
                        assert!((f64::from(s.value) - expected).abs() < 1e-12);
                    }
                }
            }
        }
    }
}
