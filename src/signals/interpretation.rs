// =============================================================================
// Signal Interpretation
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// Directional read of the total signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasLevel {
    StrongNegative,
    Negative,
    Neutral,
    NeutralPositive,
    Positive,
    StrongPositive,
}

impl BiasLevel {
    pub fn from_signal(signal: f64) -> Self {
        if signal >= 0.25 {
            Self::StrongPositive
        } else if signal >= 0.10 {
            Self::Positive
        } else if signal >= 0.05 {
            Self::NeutralPositive
        } else if signal >= -0.05 {
            Self::Neutral
        } else if signal >= -0.10 {
            Self::Negative
        } else {
            Self::StrongNegative
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::StrongPositive | Self::Positive | Self::NeutralPositive => Direction::Bullish,
            Self::Neutral => Direction::Neutral,
            Self::Negative | Self::StrongNegative => Direction::Bearish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    VeryLow,
    Low,
    Fair,
    Good,
    High,
    VeryHigh,
}

impl ConfidenceBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::VeryHigh,
            80..=89 => Self::High,
            65..=79 => Self::Good,
            50..=64 => Self::Fair,
            35..=49 => Self::Low,
            _ => Self::VeryLow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub bias: BiasLevel,
    pub direction: Direction,
    pub confidence_band: ConfidenceBand,
}

pub fn interpret(signal: f64, confidence: u8) -> Interpretation {
    let bias = BiasLevel::from_signal(signal);
    Interpretation {
        bias,
        direction: bias.direction(),
        confidence_band: ConfidenceBand::from_score(confidence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_thresholds_are_inclusive_lower_bounds() {
        assert_eq!(BiasLevel::from_signal(0.25), BiasLevel::StrongPositive);
        assert_eq!(BiasLevel::from_signal(0.2499), BiasLevel::Positive);
        assert_eq!(BiasLevel::from_signal(0.10), BiasLevel::Positive);
        assert_eq!(BiasLevel::from_signal(0.05), BiasLevel::NeutralPositive);
        assert_eq!(BiasLevel::from_signal(0.0), BiasLevel::Neutral);
        assert_eq!(BiasLevel::from_signal(-0.05), BiasLevel::Neutral);
        assert_eq!(BiasLevel::from_signal(-0.0501), BiasLevel::Negative);
        assert_eq!(BiasLevel::from_signal(-0.10), BiasLevel::Negative);
        assert_eq!(BiasLevel::from_signal(-0.3), BiasLevel::StrongNegative);
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(ConfidenceBand::from_score(100), ConfidenceBand::VeryHigh);
        assert_eq!(ConfidenceBand::from_score(90), ConfidenceBand::VeryHigh);
        assert_eq!(ConfidenceBand::from_score(80), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_score(65), ConfidenceBand::Good);
        assert_eq!(ConfidenceBand::from_score(50), ConfidenceBand::Fair);
        assert_eq!(ConfidenceBand::from_score(35), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::from_score(34), ConfidenceBand::VeryLow);
    }

    #[test]
    fn interpretation_direction() {
        let i = interpret(-0.2, 70);
        assert_eq!(i.bias, BiasLevel::StrongNegative);
        assert_eq!(i.direction, Direction::Bearish);
        assert_eq!(i.confidence_band, ConfidenceBand::Good);
    }
}
