// =============================================================================
// Volatility Regime Engine
// =============================================================================
//
// Classifies the volatility backdrop from two inputs: the volatility-index
// level and the cross-sectional dispersion of instrument total movement.
// The regime multiplier scales the macro-indicator weight only.
//
// Detection hierarchy (evaluated top-to-bottom; first match wins):
//
//   1. CRISIS  : level > 50
//   2. EXTREME : level > 35 OR dispersion > 2.5
//   3. HIGH    : level > 25 OR dispersion > 1.5
//   4. LOW     : level < 12 AND dispersion < 0.8
//   5. NORMAL  : otherwise
//
// Boundaries are strict, so a value sitting exactly on a threshold stays in
// the calmer tier.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::InputError;

/// Dispersion reported when fewer than two movements are available.
pub const DEFAULT_DISPERSION: f64 = 1.0;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
    Extreme,
    Crisis,
}

impl VolatilityRegime {
    /// Factor applied to the macro-indicator weight fraction.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Low => 0.7,
            Self::Normal => 1.0,
            Self::High => 1.3,
            Self::Extreme => 1.6,
            Self::Crisis => 2.2,
        }
    }
}

impl std::fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Normal => write!(f, "NORMAL"),
            Self::High => write!(f, "HIGH"),
            Self::Extreme => write!(f, "EXTREME"),
            Self::Crisis => write!(f, "CRISIS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityRegimeState {
    pub regime: VolatilityRegime,
    pub multiplier: f64,
    /// Population standard deviation of total movement across instruments.
    pub adrs_volatility: f64,
    /// Observed level, `None` when the default was assumed.
    pub volatility_index_level: Option<f64>,
    pub volatility_index_change: Option<f64>,
    /// Level actually used for classification.
    pub effective_level: f64,
}

impl VolatilityRegimeState {
    /// Neutral state used before the first evaluation.
    pub fn neutral(default_level: f64) -> Self {
        Self {
            regime: VolatilityRegime::Normal,
            multiplier: VolatilityRegime::Normal.multiplier(),
            adrs_volatility: DEFAULT_DISPERSION,
            volatility_index_level: None,
            volatility_index_change: None,
            effective_level: default_level,
        }
    }
}

// =============================================================================
// VolatilityRegimeEngine
// =============================================================================

/// Holds the regime computed in the latest cycle.
///
/// The stored state is never read back into a computation; each call to
/// `evaluate` depends only on its arguments.
pub struct VolatilityRegimeEngine {
    default_level: f64,
    state: RwLock<Option<VolatilityRegimeState>>,
}

impl VolatilityRegimeEngine {
    pub fn new(default_level: f64) -> Self {
        Self {
            default_level,
            state: RwLock::new(None),
        }
    }

    /// Classify the regime for one cycle and remember it.
    pub fn evaluate(
        &self,
        total_movements: &[f64],
        level: Option<f64>,
        change: Option<f64>,
    ) -> VolatilityRegimeState {
        let dispersion = match cross_sectional_volatility(total_movements) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, "dispersion falls back to default");
                DEFAULT_DISPERSION
            }
        };

        let effective_level = level
            .filter(|l| l.is_finite() && *l != 0.0)
            .unwrap_or(self.default_level);

        let regime = classify_regime(effective_level, dispersion);

        let state = VolatilityRegimeState {
            regime,
            multiplier: regime.multiplier(),
            adrs_volatility: dispersion,
            volatility_index_level: level,
            volatility_index_change: change,
            effective_level,
        };

        debug!(
            regime = %regime,
            multiplier = state.multiplier,
            level = effective_level,
            dispersion = format!("{:.4}", dispersion),
            samples = total_movements.len(),
            "volatility regime evaluated"
        );

        *self.state.write() = Some(state.clone());
        state
    }

    /// Remember a state computed earlier, e.g. one carried by a cached report.
    pub fn record(&self, state: VolatilityRegimeState) {
        *self.state.write() = Some(state);
    }

    /// Latest regime without recomputing.
    pub fn current(&self) -> Option<VolatilityRegimeState> {
        self.state.read().clone()
    }
}

// =============================================================================
// Classification logic
// =============================================================================

/// First-match-wins regime table.
pub fn classify_regime(level: f64, dispersion: f64) -> VolatilityRegime {
    if level > 50.0 {
        return VolatilityRegime::Crisis;
    }
    if level > 35.0 || dispersion > 2.5 {
        return VolatilityRegime::Extreme;
    }
    if level > 25.0 || dispersion > 1.5 {
        return VolatilityRegime::High;
    }
    if level < 12.0 && dispersion < 0.8 {
        return VolatilityRegime::Low;
    }
    VolatilityRegime::Normal
}

/// Population standard deviation of the given total movements.
pub fn cross_sectional_volatility(values: &[f64]) -> Result<f64, InputError> {
    if values.len() < 2 {
        return Err(InputError::InsufficientSample {
            required: 2,
            available: values.len(),
        });
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if !std.is_finite() {
        return Err(InputError::invalid("total_movement", "non-finite dispersion"));
    }
    Ok(std)
}
