// =============================================================================
// Input Validation
// =============================================================================
//
// Two layers:
//
//   * the core validator, applied to every value the engine consumes: a
//     variation must be finite with |value| <= 50, a closing price must be
//     finite and non-negative. Failures become `InputError`s that zero the
//     affected term.
//   * edit-boundary limits (`InputLimits`), enforced by the HTTP layer before
//     an evaluation runs. A snapshot outside these limits is rejected whole.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::EvaluationSnapshot;
use crate::errors::InputError;
use crate::runtime_config::EngineConfig;
use crate::types::{MacroImpact, ObservationSet};

/// Largest absolute variation the core will consume.
pub const MAX_ABS_VARIATION: f64 = 50.0;

/// Below this magnitude a non-zero variation is suspicious.
const TINY_VARIATION: f64 = 0.01;

/// Gap between after- and pre-market variations that earns a warning.
const LARGE_SESSION_GAP: f64 = 20.0;

// =============================================================================
// Core validator
// =============================================================================

/// Validate a percentage variation. Returns the value unchanged when usable.
pub fn validate_variation(field: &str, value: f64) -> Result<f64, InputError> {
    if !value.is_finite() {
        return Err(InputError::invalid(field, format!("non-finite value {value}")));
    }
    if value.abs() > MAX_ABS_VARIATION {
        return Err(InputError::invalid(
            field,
            format!("|value| {value} exceeds {MAX_ABS_VARIATION}"),
        ));
    }
    Ok(value)
}

/// Validate a closing price. Absent or zero is `Unavailable`; negative or
/// non-finite is `InvalidInput`.
pub fn validate_closing_price(field: &str, value: Option<f64>) -> Result<f64, InputError> {
    match value {
        None => Err(InputError::Unavailable(field.to_string())),
        Some(v) if !v.is_finite() => {
            Err(InputError::invalid(field, format!("non-finite price {v}")))
        }
        Some(v) if v < 0.0 => Err(InputError::invalid(field, format!("negative price {v}"))),
        Some(v) if v == 0.0 => Err(InputError::Unavailable(field.to_string())),
        Some(v) => Ok(v),
    }
}

/// Run the core validator over the variation fields of one observation.
///
/// The closing price is left to the reconstructor, which distinguishes an
/// unavailable price (fallback path) from an invalid one.
pub fn validate_observation(ticker: &str, obs: &ObservationSet) -> Result<(), InputError> {
    if let Some(after) = obs.after_market_pct {
        validate_variation(&format!("{ticker}.after_market_pct"), after)?;
    }
    if let Some(pre) = obs.pre_market_pct {
        validate_variation(&format!("{ticker}.pre_market_pct"), pre)?;
    }
    if let Some(close) = obs.closing_price {
        if !close.is_finite() || close < 0.0 {
            return Err(InputError::invalid(
                format!("{ticker}.closing_price"),
                format!("price {close} must be finite and non-negative"),
            ));
        }
    }
    Ok(())
}

/// Non-fatal oddities worth a log line. Returned for the report as well.
pub fn advisory_warnings(ticker: &str, obs: &ObservationSet) -> Vec<String> {
    let mut warnings = Vec::new();

    for (label, value) in [
        ("after_market_pct", obs.after_market_pct),
        ("pre_market_pct", obs.pre_market_pct),
    ] {
        if let Some(v) = value {
            if v != 0.0 && v.abs() < TINY_VARIATION {
                warnings.push(format!("{ticker}.{label}: variation {v} is unusually small"));
            }
        }
    }

    if let (Some(after), Some(pre)) = (obs.after_market_pct, obs.pre_market_pct) {
        if (after - pre).abs() > LARGE_SESSION_GAP {
            warnings.push(format!(
                "{ticker}: after-market {after} and pre-market {pre} differ by more than {LARGE_SESSION_GAP}"
            ));
        }
    }

    for w in &warnings {
        warn!(ticker, warning = %w, "input looks unusual");
    }
    warnings
}

// =============================================================================
// Edit-boundary limits
// =============================================================================

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// A single out-of-range field found at the edit boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitViolation {
    pub field: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

fn default_variation_bound() -> Bound {
    Bound::new(-10.0, 10.0)
}

fn default_wide_variation_bound() -> Bound {
    Bound::new(-20.0, 20.0)
}

fn default_level_bound() -> Bound {
    Bound::new(5.0, 80.0)
}

fn default_sensitivity_bound() -> Bound {
    Bound::new(0.1, 2.0)
}

fn default_weight_pct_bound() -> Bound {
    Bound::new(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLimits {
    #[serde(default = "default_variation_bound")]
    pub instrument_pct: Bound,

    #[serde(default = "default_variation_bound")]
    pub macro_pct: Bound,

    /// Variation of a volatility-type macro indicator.
    #[serde(default = "default_wide_variation_bound")]
    pub macro_volatility_pct: Bound,

    #[serde(default = "default_wide_variation_bound")]
    pub volatility_index_change: Bound,

    #[serde(default = "default_level_bound")]
    pub volatility_index_level: Bound,

    #[serde(default = "default_sensitivity_bound")]
    pub sensitivity: Bound,

    #[serde(default = "default_weight_pct_bound")]
    pub weight_pct: Bound,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            instrument_pct: default_variation_bound(),
            macro_pct: default_variation_bound(),
            macro_volatility_pct: default_wide_variation_bound(),
            volatility_index_change: default_wide_variation_bound(),
            volatility_index_level: default_level_bound(),
            sensitivity: default_sensitivity_bound(),
            weight_pct: default_weight_pct_bound(),
        }
    }
}

impl InputLimits {
    /// Check the tunable settings of a configuration.
    pub fn check_settings(&self, config: &EngineConfig) -> Result<()> {
        if !self.sensitivity.contains(config.sensitivity) {
            bail!(
                "sensitivity {} outside [{}, {}]",
                config.sensitivity,
                self.sensitivity.min,
                self.sensitivity.max
            );
        }
        for (name, value) in [
            ("macro_weight_pct", config.macro_weight_pct),
            ("vix_weight_pct", config.vix_weight_pct),
        ] {
            if !self.weight_pct.contains(value) {
                bail!(
                    "{name} {value} outside [{}, {}]",
                    self.weight_pct.min,
                    self.weight_pct.max
                );
            }
        }
        Ok(())
    }

    /// Collect every field of `snapshot` that falls outside its limit.
    /// An empty vector means the snapshot may be evaluated.
    pub fn check_snapshot(
        &self,
        snapshot: &EvaluationSnapshot,
        config: &EngineConfig,
    ) -> Vec<LimitViolation> {
        let mut violations = Vec::new();
        let mut check = |field: String, value: f64, bound: Bound| {
            if !bound.contains(value) {
                violations.push(LimitViolation {
                    field,
                    value,
                    min: bound.min,
                    max: bound.max,
                });
            }
        };

        for (ticker, obs) in &snapshot.observations {
            if let Some(v) = obs.after_market_pct {
                check(format!("{ticker}.after_market_pct"), v, self.instrument_pct);
            }
            if let Some(v) = obs.pre_market_pct {
                check(format!("{ticker}.pre_market_pct"), v, self.instrument_pct);
            }
        }

        for (ticker, value) in &snapshot.macro_values {
            let bound = match config.macro_indicators.iter().find(|m| &m.ticker == ticker) {
                Some(ind) if ind.impact == MacroImpact::Volatility => self.macro_volatility_pct,
                _ => self.macro_pct,
            };
            check(format!("macro.{ticker}"), *value, bound);
        }

        let vix = &snapshot.volatility_index;
        if let Some(level) = vix.level {
            check("volatility_index.level".into(), level, self.volatility_index_level);
        }
        if let Some(change) = vix.change_pct {
            check(
                "volatility_index.change_pct".into(),
                change,
                self.volatility_index_change,
            );
        }

        violations
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VolatilityIndexObservation;

    #[test]
    fn variation_bounds() {
        assert!(validate_variation("x", 50.0).is_ok());
        assert!(validate_variation("x", -50.0).is_ok());
        assert!(matches!(
            validate_variation("x", 50.01),
            Err(InputError::InvalidInput { .. })
        ));
        assert!(validate_variation("x", f64::NAN).is_err());
        assert!(validate_variation("x", f64::INFINITY).is_err());
    }

    #[test]
    fn closing_price_taxonomy() {
        assert!(matches!(
            validate_closing_price("p", None),
            Err(InputError::Unavailable(_))
        ));
        assert!(matches!(
            validate_closing_price("p", Some(0.0)),
            Err(InputError::Unavailable(_))
        ));
        assert!(matches!(
            validate_closing_price("p", Some(-3.0)),
            Err(InputError::InvalidInput { .. })
        ));
        assert!((validate_closing_price("p", Some(12.5)).unwrap() - 12.5).abs() < 1e-12);
    }

    #[test]
    fn observation_with_wild_after_market_is_invalid() {
        let obs = ObservationSet::new(Some(10.0), Some(72.0), Some(1.0));
        let err = validate_observation("VALE", &obs).unwrap_err();
        assert!(err.to_string().contains("VALE.after_market_pct"));

        let obs = ObservationSet::new(None, Some(1.0), None);
        assert!(validate_observation("VALE", &obs).is_ok());
    }

    #[test]
    fn advisory_warnings_flag_tiny_and_gapped_values() {
        let obs = ObservationSet::new(Some(10.0), Some(0.005), None);
        assert_eq!(advisory_warnings("ITUB", &obs).len(), 1);

        let obs = ObservationSet::new(Some(10.0), Some(-12.0), Some(9.0));
        assert_eq!(advisory_warnings("ITUB", &obs).len(), 1);

        let obs = ObservationSet::new(Some(10.0), Some(1.0), Some(0.5));
        assert!(advisory_warnings("ITUB", &obs).is_empty());
    }

    #[test]
    fn settings_outside_limits_are_rejected() {
        let limits = InputLimits::default();
        let mut cfg = EngineConfig::default();
        assert!(limits.check_settings(&cfg).is_ok());
        cfg.sensitivity = 0.05;
        assert!(limits.check_settings(&cfg).is_err());
        cfg.sensitivity = 1.0;
        cfg.vix_weight_pct = -1.0;
        assert!(limits.check_settings(&cfg).is_err());
    }

    #[test]
    fn snapshot_violations_are_collected() {
        let cfg = EngineConfig::default();
        let mut snapshot = EvaluationSnapshot::default();
        snapshot
            .observations
            .insert("VALE".into(), ObservationSet::new(Some(60.0), Some(11.0), Some(2.0)));
        snapshot.macro_values.insert("DXY".into(), 12.0);
        // Volatility-type macro indicators get the wider band.
        snapshot.macro_values.insert("VIX".into(), 15.0);
        snapshot.volatility_index = VolatilityIndexObservation::new(Some(90.0), Some(3.0));

        let violations = cfg.input_limits.check_snapshot(&snapshot, &cfg);
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["VALE.after_market_pct", "macro.DXY", "volatility_index.level"]
        );
    }

    #[test]
    fn clean_snapshot_has_no_violations() {
        let cfg = EngineConfig::default();
        let mut snapshot = EvaluationSnapshot::default();
        snapshot
            .observations
            .insert("PBR".into(), ObservationSet::new(Some(14.0), Some(-1.2), Some(0.4)));
        snapshot.volatility_index = VolatilityIndexObservation::new(Some(18.0), Some(-4.0));
        assert!(cfg.input_limits.check_snapshot(&snapshot, &cfg).is_empty());
    }
}
