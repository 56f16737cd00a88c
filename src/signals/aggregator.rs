// =============================================================================
// Weighted Aggregator
// =============================================================================
//
// Combines three families of terms into one directional signal:
//
//   instrument  = carried_pct * (index_w * liquidity_w * ir_w) * sens / 100
//   macro       = signed_var * indicator_w * (macro_pct/100 * regime_mult) * sens / 100
//   vol. index  = -change * band(|change|) * (vix_pct/100) * sens / 100
//
// `carried_pct` is the close -> pre spread of the reconstructed path. When the
// path cannot be reconstructed the best raw value is carried instead, in
// priority pre -> after -> closing.
//
// Every term is local: an invalid value zeroes its own term, leaves an
// `InputIssue` behind and the rest of the aggregation carries on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::errors::{InputError, InputIssue};
use crate::regime::vix::change_band_multiplier;
use crate::regime::volatility::VolatilityRegimeState;
use crate::signals::validation::validate_variation;
use crate::spread::classifier::{Category, ValidationBucket};
use crate::spread::reconstruct::SpreadAnalysis;
use crate::types::{Instrument, InstrumentGroup, MacroIndicator, ObservationSet, VolatilityIndexObservation};

// =============================================================================
// Inputs
// =============================================================================

/// One selected instrument as prepared by the evaluation cycle.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentInput<'a> {
    pub instrument: &'a Instrument,
    pub observation: &'a ObservationSet,
    /// Reconstruction outcome. `Unavailable` takes the fallback path,
    /// `InvalidInput` zeroes the term.
    pub analysis: Result<&'a SpreadAnalysis, &'a InputError>,
    pub category: Category,
    pub ir_weight: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroInput<'a> {
    pub indicator: &'a MacroIndicator,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationParams {
    /// Effective (already clamped and capped) sensitivity.
    pub sensitivity: f64,
    pub macro_weight_pct: f64,
    pub vix_weight_pct: f64,
}

// =============================================================================
// Outputs
// =============================================================================

/// Where an instrument's carried spread came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarriedSource {
    Reconstructed,
    Pre,
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentContribution {
    pub ticker: String,
    pub group: InstrumentGroup,
    pub disabled: bool,
    pub source: Option<CarriedSource>,
    pub carried_pct: f64,
    pub effective_weight: f64,
    pub contribution: f64,
    pub bucket: ValidationBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroContribution {
    pub ticker: String,
    pub variation: f64,
    pub signed_variation: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketContribution {
    pub contribution: f64,
    pub weight: f64,
    pub count: u32,
}

impl BucketContribution {
    fn add(&mut self, contribution: f64, weight: f64) {
        self.contribution += contribution;
        self.weight += weight;
        self.count += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub primary: BucketContribution,
    pub secondary: BucketContribution,
    pub macro_indicators: BucketContribution,
    pub volatility_index: BucketContribution,
}

/// Validation tallies across the selected, enabled instruments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub confirmed: u32,
    pub weakened: u32,
    pub diverged: u32,
    pub only_pre: u32,
    pub only_after: u32,
    pub only_closing: u32,
    pub incomplete: u32,
    pub invalid: u32,
    /// Per-category counts for instruments with a reconstructed path.
    pub categories: BTreeMap<Category, u32>,
}

impl ValidationStats {
    pub fn record(&mut self, bucket: ValidationBucket) {
        match bucket {
            ValidationBucket::Confirmed => self.confirmed += 1,
            ValidationBucket::Weakened => self.weakened += 1,
            ValidationBucket::Diverged => self.diverged += 1,
            ValidationBucket::OnlyPre => self.only_pre += 1,
            ValidationBucket::OnlyAfter => self.only_after += 1,
            ValidationBucket::OnlyClosing => self.only_closing += 1,
            ValidationBucket::Incomplete => self.incomplete += 1,
            ValidationBucket::Invalid => self.invalid += 1,
        }
    }

    /// Instruments with a two-source read (confirmed, weakened or diverged).
    pub fn validated(&self) -> u32 {
        self.confirmed + self.weakened + self.diverged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub signal: f64,
    pub breakdown: Breakdown,
    pub validation: ValidationStats,
    pub instruments: Vec<InstrumentContribution>,
    pub macro_contributions: Vec<MacroContribution>,
    /// Sum of index weights over every primary instrument, enabled or not.
    pub primary_index_weight: f64,
    pub macro_total: usize,
    pub issues: Vec<InputIssue>,
}

// =============================================================================
// WeightedAggregator
// =============================================================================

pub struct WeightedAggregator {
    params: AggregationParams,
}

impl WeightedAggregator {
    pub fn new(params: AggregationParams) -> Self {
        Self { params }
    }

    pub fn aggregate(
        &self,
        instruments: &[InstrumentInput<'_>],
        macros: &[MacroInput<'_>],
        vix: &VolatilityIndexObservation,
        regime: &VolatilityRegimeState,
    ) -> AggregationResult {
        let mut breakdown = Breakdown::default();
        let mut validation = ValidationStats::default();
        let mut issues = Vec::new();
        let mut contributions = Vec::with_capacity(instruments.len());
        let mut primary_index_weight = 0.0;

        // --- Instruments -------------------------------------------------------
        for input in instruments {
            let inst = input.instrument;
            if inst.group() == InstrumentGroup::Primary {
                primary_index_weight += inst.index_weight;
            }
            let c = self.instrument_term(input, &mut issues);
            if !c.disabled {
                validation.record(c.bucket);
                if let Ok(a) = input.analysis {
                    trace!(ticker = %a.ticker, category = %input.category, "tallied");
                    *validation.categories.entry(input.category).or_insert(0) += 1;
                }
                if c.source.is_some() {
                    let bucket = match c.group {
                        InstrumentGroup::Primary => &mut breakdown.primary,
                        InstrumentGroup::Secondary => &mut breakdown.secondary,
                    };
                    bucket.add(c.contribution, c.effective_weight);
                }
            }
            contributions.push(c);
        }

        // --- Macro indicators --------------------------------------------------
        let macro_fraction = self.params.macro_weight_pct / 100.0 * regime.multiplier;
        let mut macro_contributions = Vec::new();
        for m in macros {
            let Some(value) = m.value else { continue };
            if value == 0.0 {
                continue;
            }
            let field = format!("macro.{}", m.indicator.ticker);
            if let Err(e) = validate_variation(&field, value) {
                warn!(indicator = %m.indicator.ticker, error = %e, "macro term zeroed");
                issues.push(InputIssue::new(&m.indicator.ticker, &e));
                continue;
            }

            let signed = if m.indicator.impact.is_inverse() {
                -value
            } else {
                value
            };
            let contribution =
                signed * m.indicator.weight * macro_fraction * self.params.sensitivity / 100.0;
            if !contribution.is_finite() {
                let e = InputError::invalid(field, "non-finite contribution");
                warn!(indicator = %m.indicator.ticker, error = %e, "macro term zeroed");
                issues.push(InputIssue::new(&m.indicator.ticker, &e));
                continue;
            }

            breakdown
                .macro_indicators
                .add(contribution, m.indicator.weight * macro_fraction);
            macro_contributions.push(MacroContribution {
                ticker: m.indicator.ticker.clone(),
                variation: value,
                signed_variation: signed,
                contribution,
            });
        }

        // --- Volatility index --------------------------------------------------
        if vix.has_level() && vix.has_change() {
            if let Some(change) = vix.change_pct {
                match validate_variation("volatility_index.change_pct", change) {
                    Ok(change) => {
                        let fraction = self.params.vix_weight_pct / 100.0;
                        let contribution = -change
                            * change_band_multiplier(change)
                            * fraction
                            * self.params.sensitivity
                            / 100.0;
                        breakdown.volatility_index.add(contribution, fraction);
                    }
                    Err(e) => {
                        warn!(error = %e, "volatility-index term zeroed");
                        issues.push(InputIssue::new("volatility_index", &e));
                    }
                }
            }
        }

        let signal = breakdown.primary.contribution
            + breakdown.secondary.contribution
            + breakdown.macro_indicators.contribution
            + breakdown.volatility_index.contribution;

        debug!(
            signal = format!("{:.6}", signal),
            primary = format!("{:.6}", breakdown.primary.contribution),
            secondary = format!("{:.6}", breakdown.secondary.contribution),
            macro_ = format!("{:.6}", breakdown.macro_indicators.contribution),
            vix = format!("{:.6}", breakdown.volatility_index.contribution),
            regime = %regime.regime,
            "aggregation complete"
        );

        AggregationResult {
            signal,
            breakdown,
            validation,
            instruments: contributions,
            macro_contributions,
            primary_index_weight,
            macro_total: macros.len(),
            issues,
        }
    }

    fn instrument_term(
        &self,
        input: &InstrumentInput<'_>,
        issues: &mut Vec<InputIssue>,
    ) -> InstrumentContribution {
        let inst = input.instrument;
        let mut out = InstrumentContribution {
            ticker: inst.ticker.clone(),
            group: inst.group(),
            disabled: input.observation.disabled,
            source: None,
            carried_pct: 0.0,
            effective_weight: 0.0,
            contribution: 0.0,
            bucket: ValidationBucket::Incomplete,
        };
        if out.disabled {
            return out;
        }

        let carried = match input.analysis {
            Ok(a) => Ok(Some((CarriedSource::Reconstructed, a.pre_spread_pct, input.category.bucket()))),
            Err(e) if matches!(e, InputError::InvalidInput { .. }) => Err(e.clone()),
            Err(_) => Ok(fallback(input.observation)),
        };

        let (source, carried_pct, bucket) = match carried {
            Ok(Some(found)) => found,
            Ok(None) => return out,
            Err(e) => {
                warn!(ticker = %inst.ticker, error = %e, "instrument term zeroed");
                issues.push(InputIssue::new(&inst.ticker, &e));
                out.bucket = ValidationBucket::Invalid;
                return out;
            }
        };

        let effective_weight = inst.base_weight() * input.ir_weight;
        let contribution = carried_pct * effective_weight * self.params.sensitivity / 100.0;
        if !contribution.is_finite() {
            let e = InputError::invalid(format!("{}.contribution", inst.ticker), "non-finite contribution");
            warn!(ticker = %inst.ticker, error = %e, "instrument term zeroed");
            issues.push(InputIssue::new(&inst.ticker, &e));
            out.bucket = ValidationBucket::Invalid;
            return out;
        }

        trace!(
            ticker = %inst.ticker,
            source = ?source,
            carried_pct,
            effective_weight,
            contribution,
            "instrument term"
        );

        out.source = Some(source);
        out.carried_pct = carried_pct;
        out.effective_weight = effective_weight;
        out.contribution = contribution;
        out.bucket = bucket;
        out
    }
}

/// Best raw value when the path cannot be reconstructed.
///
/// A closing price that failed reconstruction carries no spread, so it is
/// not a fallback: closing-only data stays incomplete and adds no weight.
fn fallback(obs: &ObservationSet) -> Option<(CarriedSource, f64, ValidationBucket)> {
    if let Some(pre) = obs.pre_market_pct {
        return Some((CarriedSource::Pre, pre, ValidationBucket::OnlyPre));
    }
    obs.after_market_pct
        .map(|after| (CarriedSource::After, after, ValidationBucket::OnlyAfter))
}
