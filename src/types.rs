// =============================================================================
// Shared types used across the bias engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional read of a signal or classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    /// Direction implied by the sign of a value. Zero is neutral.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Self::Bullish
        } else if value < 0.0 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Which of the two disjoint instrument sets a ticker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentGroup {
    Primary,
    Secondary,
}

impl std::fmt::Display for InstrumentGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// A cross-listed security tracked for the directional signal.
///
/// Statically defined at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    /// Share of the reference index, 0–100.
    pub index_weight: f64,
    /// Discount factor for thinner names, (0, 1].
    pub liquidity_weight: f64,
    #[serde(default)]
    pub is_secondary: bool,
}

impl Instrument {
    pub fn new(
        ticker: impl Into<String>,
        name: impl Into<String>,
        index_weight: f64,
        liquidity_weight: f64,
        is_secondary: bool,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            index_weight,
            liquidity_weight,
            is_secondary,
        }
    }

    pub fn group(&self) -> InstrumentGroup {
        if self.is_secondary {
            InstrumentGroup::Secondary
        } else {
            InstrumentGroup::Primary
        }
    }

    /// Index weight discounted by liquidity, before any dynamic adjustment.
    pub fn base_weight(&self) -> f64 {
        self.index_weight * self.liquidity_weight
    }
}

/// How a macro indicator's variation maps onto the index direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroImpact {
    Direct,
    Correlated,
    Sectoral,
    Inverse,
    /// Volatility gauges move against risk assets.
    Volatility,
}

impl MacroImpact {
    pub fn is_inverse(self) -> bool {
        matches!(self, Self::Inverse | Self::Volatility)
    }
}

/// A macro indicator with its fixed weight and impact sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    pub weight: f64,
    pub impact: MacroImpact,
}

impl MacroIndicator {
    pub fn new(
        ticker: impl Into<String>,
        name: impl Into<String>,
        weight: f64,
        impact: MacroImpact,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            weight,
            impact,
        }
    }
}

/// Raw market inputs for one instrument at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    /// Closing price in currency units.
    #[serde(default)]
    pub closing_price: Option<f64>,
    /// Percentage move from the close during the after-market session.
    #[serde(default)]
    pub after_market_pct: Option<f64>,
    /// Percentage move layered on top of the after-market price.
    #[serde(default)]
    pub pre_market_pct: Option<f64>,
    /// Explicit exclusion flag.
    #[serde(default)]
    pub disabled: bool,
}

impl ObservationSet {
    pub fn new(closing_price: Option<f64>, after_pct: Option<f64>, pre_pct: Option<f64>) -> Self {
        Self {
            closing_price,
            after_market_pct: after_pct,
            pre_market_pct: pre_pct,
            disabled: false,
        }
    }

    /// True when none of the three fields carries a value.
    pub fn is_empty(&self) -> bool {
        self.closing_price.is_none() && self.after_market_pct.is_none() && self.pre_market_pct.is_none()
    }
}

/// Volatility-index level and period-over-period percentage change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilityIndexObservation {
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub change_pct: Option<f64>,
}

impl VolatilityIndexObservation {
    pub fn new(level: Option<f64>, change_pct: Option<f64>) -> Self {
        Self { level, change_pct }
    }

    /// Level present and non-zero.
    pub fn has_level(&self) -> bool {
        matches!(self.level, Some(l) if l != 0.0 && l.is_finite())
    }

    /// Change present and non-zero.
    pub fn has_change(&self) -> bool {
        matches!(self.change_pct, Some(c) if c != 0.0 && c.is_finite())
    }
}

/// Round to a fixed number of decimal places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_sign() {
        assert_eq!(Direction::from_sign(0.3), Direction::Bullish);
        assert_eq!(Direction::from_sign(-0.3), Direction::Bearish);
        assert_eq!(Direction::from_sign(0.0), Direction::Neutral);
    }

    #[test]
    fn inverse_impacts() {
        assert!(MacroImpact::Inverse.is_inverse());
        assert!(MacroImpact::Volatility.is_inverse());
        assert!(!MacroImpact::Direct.is_inverse());
        assert!(!MacroImpact::Sectoral.is_inverse());
    }

    #[test]
    fn observation_deserialises_missing_fields_as_none() {
        let obs: ObservationSet = serde_json::from_str(r#"{ "after_market_pct": 1.5 }"#).unwrap();
        assert_eq!(obs.closing_price, None);
        assert_eq!(obs.after_market_pct, Some(1.5));
        assert!(!obs.disabled);
        assert!(!obs.is_empty());
        assert!(ObservationSet::default().is_empty());
    }

    #[test]
    fn volatility_index_presence_treats_zero_as_missing() {
        let obs = VolatilityIndexObservation::new(Some(0.0), Some(2.0));
        assert!(!obs.has_level());
        assert!(obs.has_change());
    }

    #[test]
    fn round_to_decimals() {
        assert!((round_to(5.060000000000002, 4) - 5.06).abs() < 1e-12);
        assert!((round_to(105.0649, 2) - 105.06).abs() < 1e-12);
    }
}
