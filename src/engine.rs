// =============================================================================
// Evaluation Engine — one cycle from snapshot to report
// =============================================================================
//
// Pipeline per cycle:
//
//   1. Effective sensitivity (manual, clamped, capped by the index level)
//   2. Instrument selection (primary, plus secondary when enabled)
//   3. Per instrument: validate -> reconstruct -> classify -> information ratio
//   4. Volatility regime over the total movements
//   5. Weighted aggregation
//   6. Confidence
//   7. Interpretation
//   8. Clustering update (the only state carried between cycles) and timing
//
// Steps 1-7 are a function of the snapshot and the config, so two cycles over
// the same snapshot agree bit for bit there. Step 8 is `complete_cycle`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{InputError, InputIssue};
use crate::regime::clustering::{ClusteringResult, VolatilityClusteringDetector};
use crate::regime::vix::{
    effective_sensitivity, present_level, relevance, sensitivity_limit, SensitivityLimit,
    VixRelevance,
};
use crate::regime::volatility::{VolatilityRegimeEngine, VolatilityRegimeState};
use crate::runtime_config::EngineConfig;
use crate::signals::aggregator::{
    AggregationParams, Breakdown, CarriedSource, InstrumentInput, MacroContribution, MacroInput,
    ValidationStats, WeightedAggregator,
};
use crate::signals::confidence::{ConfidenceScore, ConfidenceScorer};
use crate::signals::information_ratio::{self, InformationRatio, InformationRatioSummary, NEUTRAL_IR_WEIGHT};
use crate::signals::interpretation::{interpret, Interpretation};
use crate::signals::timing::{timing_effect, TimingEffect};
use crate::signals::validation::{advisory_warnings, validate_observation};
use crate::spread::classifier::{classify, Classification};
use crate::spread::reconstruct::{reconstruct, SpreadAnalysis};
use crate::types::{InstrumentGroup, ObservationSet, VolatilityIndexObservation};

// =============================================================================
// Snapshot
// =============================================================================

/// Every input of one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSnapshot {
    /// Keyed by ticker. Instruments without an entry count as empty.
    #[serde(default)]
    pub observations: BTreeMap<String, ObservationSet>,
    /// Macro-indicator variations keyed by ticker.
    #[serde(default)]
    pub macro_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub volatility_index: VolatilityIndexObservation,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    snapshot: &'a EvaluationSnapshot,
    sensitivity: f64,
    macro_weight_pct: f64,
    vix_weight_pct: f64,
    include_secondary: bool,
    auto_adjust_sensitivity: bool,
}

impl EvaluationSnapshot {
    /// Lowercase hex SHA-256 of the canonical JSON of the snapshot plus the
    /// settings that influence the result.
    pub fn fingerprint(&self, config: &EngineConfig) -> Result<String, serde_json::Error> {
        let input = FingerprintInput {
            snapshot: self,
            sensitivity: config.sensitivity,
            macro_weight_pct: config.macro_weight_pct,
            vix_weight_pct: config.vix_weight_pct,
            include_secondary: config.include_secondary,
            auto_adjust_sensitivity: config.auto_adjust_sensitivity,
        };
        let bytes = serde_json::to_vec(&input)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub ticker: String,
    pub group: InstrumentGroup,
    pub disabled: bool,
    pub analysis: Option<SpreadAnalysis>,
    pub classification: Classification,
    pub information_ratio: Option<InformationRatio>,
    pub source: Option<CarriedSource>,
    pub effective_weight: f64,
    pub contribution: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: Option<String>,
    pub effective_sensitivity: f64,
    pub sensitivity_limit: Option<SensitivityLimit>,
    pub vix_relevance: Option<VixRelevance>,
    pub signal: f64,
    /// Signal scaled by the clustering recommendation multiplier.
    pub clustering_adjusted_signal: f64,
    pub breakdown: Breakdown,
    pub confidence: ConfidenceScore,
    pub regime: VolatilityRegimeState,
    pub clustering: ClusteringResult,
    pub validation: ValidationStats,
    pub information_ratio: InformationRatioSummary,
    pub instruments: Vec<InstrumentReport>,
    pub macro_contributions: Vec<MacroContribution>,
    pub issues: Vec<InputIssue>,
    pub interpretation: Interpretation,
    pub timing: TimingEffect,
}

// =============================================================================
// Engine
// =============================================================================

struct PreparedInstrument {
    observation: ObservationSet,
    outcome: Result<SpreadAnalysis, InputError>,
    classification: Classification,
    ir: Option<InformationRatio>,
    warnings: Vec<String>,
}

pub struct Engine {
    config: RwLock<EngineConfig>,
    offset: FixedOffset,
    regime: VolatilityRegimeEngine,
    clustering: VolatilityClusteringDetector,
}

impl Engine {
    /// Build an engine. Fails only on corrupt static configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().context("engine config rejected")?;

        let offset = FixedOffset::east_opt(config.clustering_utc_offset_hours * 3600)
            .context("clustering UTC offset out of range")?;

        info!(
            primary = config.primary.len(),
            secondary = config.secondary.len(),
            macro_indicators = config.macro_indicators.len(),
            utc_offset_hours = config.clustering_utc_offset_hours,
            "bias engine initialised"
        );

        Ok(Self {
            regime: VolatilityRegimeEngine::new(config.default_volatility_index_level),
            clustering: VolatilityClusteringDetector::new(offset),
            offset,
            config: RwLock::new(config),
        })
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Replace the configuration. The clustering history is kept.
    pub fn update_config(&self, config: EngineConfig) -> Result<()> {
        config.validate().context("engine config rejected")?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn fingerprint(&self, snapshot: &EvaluationSnapshot) -> Result<String, serde_json::Error> {
        snapshot.fingerprint(&self.config.read())
    }

    pub fn regime(&self) -> Option<VolatilityRegimeState> {
        self.regime.current()
    }

    pub fn clustering(&self) -> Option<ClusteringResult> {
        self.clustering.clustering_result()
    }

    /// Run one evaluation cycle.
    pub fn evaluate(&self, snapshot: &EvaluationSnapshot, now: DateTime<Utc>) -> EvaluationReport {
        let cfg = self.config();
        let vix = snapshot.volatility_index;
        let level = present_level(vix.level);

        // --- 1. Sensitivity ----------------------------------------------------
        let sensitivity = effective_sensitivity(cfg.sensitivity, cfg.auto_adjust_sensitivity, level);

        // --- 2 + 3. Per-instrument analysis ------------------------------------
        let selected: Vec<_> = cfg.active_instruments().collect();
        for ticker in snapshot.observations.keys() {
            if !selected.iter().any(|i| &i.ticker == ticker) {
                debug!(ticker = %ticker, "observation for unselected instrument ignored");
            }
        }

        let prepared: Vec<PreparedInstrument> = selected
            .iter()
            .map(|inst| {
                let observation = snapshot
                    .observations
                    .get(&inst.ticker)
                    .cloned()
                    .unwrap_or_default();
                prepare(&inst.ticker, observation)
            })
            .collect();

        // --- 4. Volatility regime ----------------------------------------------
        let movements: Vec<f64> = prepared
            .iter()
            .filter_map(|p| p.outcome.as_ref().ok())
            .map(|a| a.total_movement)
            .collect();
        let regime = self.regime.evaluate(&movements, vix.level, vix.change_pct);

        // --- 5. Aggregation ----------------------------------------------------
        let inputs: Vec<InstrumentInput<'_>> = selected
            .iter()
            .zip(&prepared)
            .map(|(inst, p)| InstrumentInput {
                instrument: inst,
                observation: &p.observation,
                analysis: p.outcome.as_ref(),
                category: p.classification.category,
                ir_weight: p.ir.map_or(NEUTRAL_IR_WEIGHT, |ir| ir.dynamic_weight),
            })
            .collect();
        let macros: Vec<MacroInput<'_>> = cfg
            .macro_indicators
            .iter()
            .map(|indicator| MacroInput {
                indicator,
                value: snapshot.macro_values.get(&indicator.ticker).copied(),
            })
            .collect();

        let aggregator = WeightedAggregator::new(AggregationParams {
            sensitivity,
            macro_weight_pct: cfg.macro_weight_pct,
            vix_weight_pct: cfg.vix_weight_pct,
        });
        let agg = aggregator.aggregate(&inputs, &macros, &vix, &regime);

        // --- 6. Confidence -----------------------------------------------------
        let confidence = ConfidenceScorer::new(cfg.auto_adjust_sensitivity).score(&agg, &regime, &vix);

        // --- 7. Interpretation -------------------------------------------------
        let interpretation = interpret(agg.signal, confidence.value);

        let information_ratio = InformationRatioSummary::from_ratios(
            prepared.iter().filter(|p| !p.observation.disabled).map(|p| p.ir.as_ref()),
        );

        let instruments: Vec<InstrumentReport> = selected
            .iter()
            .zip(prepared)
            .zip(&agg.instruments)
            .map(|((inst, p), c)| InstrumentReport {
                ticker: inst.ticker.clone(),
                group: inst.group(),
                disabled: p.observation.disabled,
                analysis: p.outcome.ok(),
                classification: p.classification,
                information_ratio: p.ir,
                source: c.source,
                effective_weight: c.effective_weight,
                contribution: c.contribution,
                warnings: p.warnings,
            })
            .collect();

        let mut report = EvaluationReport {
            id: Uuid::new_v4(),
            timestamp: now,
            fingerprint: snapshot.fingerprint(&cfg).ok(),
            effective_sensitivity: sensitivity,
            sensitivity_limit: level.map(sensitivity_limit),
            vix_relevance: vix.change_pct.filter(|c| c.is_finite()).map(relevance),
            signal: agg.signal,
            clustering_adjusted_signal: agg.signal,
            breakdown: agg.breakdown,
            confidence,
            regime,
            clustering: ClusteringResult::idle(),
            validation: agg.validation,
            information_ratio,
            instruments,
            macro_contributions: agg.macro_contributions,
            issues: agg.issues,
            interpretation,
            timing: timing_effect(now, self.offset),
        };

        // --- 8. Clustering and timing ------------------------------------------
        self.complete_cycle(&mut report, now);

        info!(
            id = %report.id,
            signal = format!("{:.4}", report.signal),
            confidence = report.confidence.value,
            bias = ?report.interpretation.bias,
            regime = %report.regime.regime,
            clustering = report.clustering.is_active,
            issues = report.issues.len(),
            "evaluation complete"
        );

        report
    }

    /// Clock-dependent tail of a cycle: clustering update, timestamp and
    /// timing. Runs on every cycle, including ones whose report is served
    /// from a cache, so the clustering history sees each cycle once.
    pub fn complete_cycle(&self, report: &mut EvaluationReport, now: DateTime<Utc>) {
        let volatilities: Vec<f64> = report
            .instruments
            .iter()
            .filter(|i| !i.disabled)
            .filter_map(|i| i.analysis.as_ref())
            .map(|a| a.pre_spread_pct.abs())
            .collect();

        report.clustering = if volatilities.is_empty() {
            ClusteringResult::idle()
        } else {
            let avg = volatilities.iter().sum::<f64>() / volatilities.len() as f64;
            let max = volatilities.iter().copied().fold(f64::MIN, f64::max);
            self.clustering.update(avg, max, now)
        };
        report.clustering_adjusted_signal =
            report.signal * report.clustering.recommendation.multiplier;
        report.timestamp = now;
        report.timing = timing_effect(now, self.offset);
        self.regime.record(report.regime.clone());
    }
}

/// Validate, reconstruct, classify and weigh one instrument.
fn prepare(ticker: &str, observation: ObservationSet) -> PreparedInstrument {
    if observation.disabled {
        debug!(ticker, "instrument disabled");
        return PreparedInstrument {
            outcome: Err(InputError::Unavailable(format!("{ticker} (disabled)"))),
            observation,
            classification: Classification::incomplete(),
            ir: None,
            warnings: Vec::new(),
        };
    }

    let warnings = advisory_warnings(ticker, &observation);
    let outcome = validate_observation(ticker, &observation).and_then(|_| {
        reconstruct(
            ticker,
            observation.closing_price,
            observation.after_market_pct,
            observation.pre_market_pct,
        )
    });

    let classification = classify(outcome.as_ref().ok());
    let ir = outcome.as_ref().ok().map(information_ratio::compute);

    debug!(
        ticker,
        category = %classification.category,
        confidence = classification.confidence_pct,
        direction = %classification.direction,
        ir_weight = ir.map(|i| i.dynamic_weight),
        reconstructed = outcome.is_ok(),
        "instrument analysed"
    );

    PreparedInstrument {
        observation,
        outcome,
        classification,
        ir,
        warnings,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::volatility::VolatilityRegime;
    use crate::spread::classifier::Category;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 4, 11, 30, 0).unwrap()
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    fn snapshot() -> EvaluationSnapshot {
        let mut s = EvaluationSnapshot::default();
        s.observations
            .insert("VALE".into(), ObservationSet::new(Some(61.2), Some(0.8), Some(0.4)));
        s.observations
            .insert("ITUB".into(), ObservationSet::new(Some(6.1), Some(-0.3), Some(0.2)));
        s.observations
            .insert("PBR".into(), ObservationSet::new(Some(14.3), Some(1.1), None));
        s.observations
            .insert("BBD".into(), ObservationSet::new(None, Some(0.6), Some(0.3)));
        s.macro_values.insert("EWZ_CLOSE".into(), 0.9);
        s.macro_values.insert("DXY".into(), -0.2);
        s.macro_values.insert("CL=F".into(), 1.4);
        s.volatility_index = VolatilityIndexObservation::new(Some(18.5), Some(-3.2));
        s
    }

    #[test]
    fn full_cycle_produces_consistent_report() {
        let e = engine();
        let r = e.evaluate(&snapshot(), now());

        assert_eq!(r.instruments.len(), 8);
        let sum = r.breakdown.primary.contribution
            + r.breakdown.secondary.contribution
            + r.breakdown.macro_indicators.contribution
            + r.breakdown.volatility_index.contribution;
        assert!((r.signal - sum).abs() < 1e-12);
        assert!(r.fingerprint.is_some());
        assert_eq!(r.regime.regime, VolatilityRegime::Normal);
        assert_eq!(r.breakdown.macro_indicators.count, 3);
        assert_eq!(r.breakdown.volatility_index.count, 1);

        let bbd = r.instruments.iter().find(|i| i.ticker == "BBD").unwrap();
        assert_eq!(bbd.source, Some(CarriedSource::Pre));
        assert_eq!(bbd.classification.category, Category::Incomplete);
        assert_eq!(r.validation.only_pre, 1);

        // Four instruments have no observation at all.
        assert_eq!(r.validation.incomplete, 4);
    }

    #[test]
    fn repeated_cycles_are_identical() {
        let e = engine();
        let s = snapshot();
        let a = e.evaluate(&s, now());
        let b = e.evaluate(&s, now());

        assert_ne!(a.id, b.id);
        let strip = |r: &EvaluationReport| EvaluationReport {
            id: Uuid::nil(),
            ..r.clone()
        };
        assert_eq!(strip(&a), strip(&b));
        assert_eq!(a.signal.to_bits(), b.signal.to_bits());
    }

    #[test]
    fn repeated_timestamp_does_not_grow_clustering_history() {
        let e = engine();
        let s = snapshot();
        for i in 0..3 {
            e.evaluate(&s, now() + Duration::minutes(i));
        }
        let before = e.clustering.snapshot();
        e.evaluate(&s, now() + Duration::minutes(2));
        let after = e.clustering.snapshot();
        assert_eq!(before.duration, after.duration);
        let day = e.clustering.day_key(now());
        assert_eq!(after.history[&day].len(), 3);
    }

    #[test]
    fn disabled_instrument_is_excluded_everywhere() {
        let e = engine();
        let mut s = snapshot();
        let baseline = e.evaluate(&s, now());

        s.observations.get_mut("VALE").unwrap().disabled = true;
        let r = e.evaluate(&s, now() + Duration::minutes(1));
        let vale = r.instruments.iter().find(|i| i.ticker == "VALE").unwrap();
        assert!(vale.disabled);
        assert_eq!(vale.contribution, 0.0);
        assert!(vale.analysis.is_none());
        assert!(r.breakdown.primary.weight < baseline.breakdown.primary.weight);
        assert_eq!(r.breakdown.primary.count + 1, baseline.breakdown.primary.count);
    }

    #[test]
    fn secondary_flag_controls_selection() {
        let mut cfg = EngineConfig::default();
        cfg.include_secondary = false;
        let e = Engine::new(cfg).unwrap();
        let mut s = snapshot();
        s.observations
            .insert("ERJ".into(), ObservationSet::new(Some(30.0), Some(2.0), Some(1.0)));
        let r = e.evaluate(&s, now());
        assert_eq!(r.instruments.len(), 6);
        assert_eq!(r.breakdown.secondary.count, 0);
    }

    #[test]
    fn invalid_instrument_is_zeroed_and_reported() {
        let e = engine();
        let mut s = snapshot();
        s.observations
            .insert("PBR".into(), ObservationSet::new(Some(14.3), Some(75.0), None));
        let r = e.evaluate(&s, now());
        let pbr = r.instruments.iter().find(|i| i.ticker == "PBR").unwrap();
        assert_eq!(pbr.contribution, 0.0);
        assert!(r.issues.iter().any(|i| i.source == "PBR"));
        assert_eq!(r.validation.invalid, 1);
    }

    #[test]
    fn sensitivity_is_capped_by_index_level() {
        let mut cfg = EngineConfig::default();
        cfg.sensitivity = 2.0;
        let e = Engine::new(cfg).unwrap();
        let mut s = snapshot();
        s.volatility_index = VolatilityIndexObservation::new(Some(65.0), Some(2.0));
        let r = e.evaluate(&s, now());
        assert!((r.effective_sensitivity - 0.8).abs() < 1e-12);
        assert_eq!(r.regime.regime, VolatilityRegime::Crisis);
        assert!(r.sensitivity_limit.is_some());
    }

    #[test]
    fn empty_snapshot_is_neutral() {
        let e = engine();
        let r = e.evaluate(&EvaluationSnapshot::default(), now());
        assert_eq!(r.signal, 0.0);
        assert_eq!(r.validation.incomplete, 8);
        assert!(!r.clustering.is_active);
        assert_eq!(r.clustering.sample_size, 0);
        assert!((r.regime.adrs_volatility - 1.0).abs() < 1e-12);
        assert!((r.regime.effective_level - 20.0).abs() < 1e-12);
    }

    #[test]
    fn fingerprint_tracks_inputs_and_settings() {
        let cfg = EngineConfig::default();
        let s = snapshot();
        let fp = s.fingerprint(&cfg).unwrap();
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, s.fingerprint(&cfg).unwrap());

        let mut changed = s.clone();
        changed.macro_values.insert("GC=F".into(), 0.1);
        assert_ne!(fp, changed.fingerprint(&cfg).unwrap());

        let mut cfg2 = cfg.clone();
        cfg2.sensitivity = 1.2;
        assert_ne!(fp, s.fingerprint(&cfg2).unwrap());
    }

    #[test]
    fn config_update_is_validated() {
        let e = engine();
        let mut cfg = e.config();
        cfg.macro_weight_pct = 30.0;
        assert!(e.update_config(cfg).is_ok());
        assert!((e.config().macro_weight_pct - 30.0).abs() < 1e-12);

        let mut bad = e.config();
        bad.primary.clear();
        assert!(e.update_config(bad).is_err());
        assert_eq!(e.config().primary.len(), 6);
    }
}
