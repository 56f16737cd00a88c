// =============================================================================
// Divergence Classifier
// =============================================================================
//
// Qualitative read of a reconstructed price path. Evaluation order (first
// match wins):
//
//   1. INCOMPLETE   : no spread analysis
//   2. CLOSING ONLY : after and pre spreads both zero; banded on the close
//   3. AFTER ONLY   : no pre-market reading; banded on the after spread
//   4. SAME SIGN    : after and after->pre on the same side of zero;
//                      banded on their difference
//   5. DIVERGENCE   : everything else, see `classify_divergence`
//
// Magnitude bands for the single-source cases: |v| < 0.1 neutral, < 1.0 weak,
// otherwise strong.

use serde::{Deserialize, Serialize};

use crate::spread::reconstruct::SpreadAnalysis;
use crate::types::Direction;

// =============================================================================
// Types
// =============================================================================

/// Mutually exclusive classification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Incomplete,
    ClosingNeutral,
    ClosingWeak,
    ClosingStrong,
    AfterNeutral,
    AfterWeak,
    AfterStrong,
    ConfirmedSameDirection,
    WeakenedSameDirection,
    DivergenceIntensity,
    StrongBullishDivergence,
    ModerateBullishDivergence,
    WeakBullishDivergence,
    StrongBearishDivergence,
    ModerateBearishDivergence,
    WeakBearishDivergence,
    StrongConfirmation,
    ModerateConfirmation,
    WeakConfirmation,
    NeutralDivergence,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::ClosingNeutral => "closing_neutral",
            Self::ClosingWeak => "closing_weak",
            Self::ClosingStrong => "closing_strong",
            Self::AfterNeutral => "after_neutral",
            Self::AfterWeak => "after_weak",
            Self::AfterStrong => "after_strong",
            Self::ConfirmedSameDirection => "confirmed_same_direction",
            Self::WeakenedSameDirection => "weakened_same_direction",
            Self::DivergenceIntensity => "divergence_intensity",
            Self::StrongBullishDivergence => "strong_bullish_divergence",
            Self::ModerateBullishDivergence => "moderate_bullish_divergence",
            Self::WeakBullishDivergence => "weak_bullish_divergence",
            Self::StrongBearishDivergence => "strong_bearish_divergence",
            Self::ModerateBearishDivergence => "moderate_bearish_divergence",
            Self::WeakBearishDivergence => "weak_bearish_divergence",
            Self::StrongConfirmation => "strong_confirmation",
            Self::ModerateConfirmation => "moderate_confirmation",
            Self::WeakConfirmation => "weak_confirmation",
            Self::NeutralDivergence => "neutral_divergence",
        }
    }

    /// Validation-quality bucket this category is tallied under.
    pub fn bucket(self) -> ValidationBucket {
        match self {
            Self::Incomplete => ValidationBucket::Incomplete,
            Self::ClosingNeutral | Self::ClosingWeak | Self::ClosingStrong => {
                ValidationBucket::OnlyClosing
            }
            Self::AfterNeutral | Self::AfterWeak | Self::AfterStrong => {
                ValidationBucket::OnlyAfter
            }
            Self::ConfirmedSameDirection
            | Self::StrongConfirmation
            | Self::ModerateConfirmation
            | Self::WeakConfirmation => ValidationBucket::Confirmed,
            Self::WeakenedSameDirection => ValidationBucket::Weakened,
            Self::DivergenceIntensity
            | Self::StrongBullishDivergence
            | Self::ModerateBullishDivergence
            | Self::WeakBullishDivergence
            | Self::StrongBearishDivergence
            | Self::ModerateBearishDivergence
            | Self::WeakBearishDivergence
            | Self::NeutralDivergence => ValidationBucket::Diverged,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse buckets used by the confidence scorer's validation-quality term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationBucket {
    Confirmed,
    Weakened,
    Diverged,
    OnlyPre,
    OnlyAfter,
    OnlyClosing,
    Incomplete,
    Invalid,
}

/// Presentation tone. Carried for consumers, not used by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Bullish,
    Bearish,
    Warning,
    Neutral,
}

impl From<Direction> for Tone {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Bullish => Self::Bullish,
            Direction::Bearish => Self::Bearish,
            Direction::Neutral => Self::Neutral,
        }
    }
}

/// Intensity band of a two-source divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityBand {
    Strong,
    Moderate,
    Weak,
}

impl IntensityBand {
    /// > 2.0 strong, > 1.0 moderate, otherwise weak.
    pub fn of(intensity: f64) -> Self {
        if intensity > 2.0 {
            Self::Strong
        } else if intensity > 1.0 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub confidence_pct: u8,
    pub direction: Direction,
    pub intensity: f64,
    pub tone: Tone,
    pub recommendation: String,
}

impl Classification {
    fn new(
        category: Category,
        confidence_pct: u8,
        direction: Direction,
        intensity: f64,
        tone: Tone,
        recommendation: &str,
    ) -> Self {
        Self {
            category,
            confidence_pct,
            direction,
            intensity,
            tone,
            recommendation: recommendation.to_string(),
        }
    }

    pub fn incomplete() -> Self {
        Self::new(
            Category::Incomplete,
            0,
            Direction::Neutral,
            0.0,
            Tone::Neutral,
            "waiting for closing data",
        )
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classify a spread analysis. Total: `None` yields `Incomplete`.
pub fn classify(spread: Option<&SpreadAnalysis>) -> Classification {
    let Some(s) = spread else {
        return Classification::incomplete();
    };

    if s.after_spread_pct == 0.0 && s.pre_spread_pct == 0.0 {
        return closing_only(s.closing_price);
    }

    if !s.has_pre_market {
        return after_only(s.after_spread_pct);
    }

    let after = s.after_spread_pct;
    let after_to_pre = s.after_to_pre_spread_pct;

    // Three-way sign: a flat leg never matches a moving one.
    if Direction::from_sign(after) == Direction::from_sign(after_to_pre) {
        return same_direction(after, after_to_pre);
    }

    classify_divergence(after, after_to_pre)
}

/// Sign-and-intensity classification of two sequential deltas.
///
/// The bullish / bearish checks run before the generic confirmation check, so
/// two strictly same-signed deltas always report as a divergence.
pub fn classify_divergence(after: f64, after_to_pre: f64) -> Classification {
    let intensity = after.abs() + after_to_pre.abs();
    let band = IntensityBand::of(intensity);

    if after > 0.0 && after_to_pre > 0.0 {
        let (category, confidence, text) = match band {
            IntensityBand::Strong => (Category::StrongBullishDivergence, 85, "strong buy signal"),
            IntensityBand::Moderate => (Category::ModerateBullishDivergence, 70, "buy signal"),
            IntensityBand::Weak => (Category::WeakBullishDivergence, 60, "weak signal, monitor"),
        };
        return Classification::new(category, confidence, Direction::Bullish, intensity, Tone::Bullish, text);
    }

    if after < 0.0 && after_to_pre < 0.0 {
        let (category, confidence, text) = match band {
            IntensityBand::Strong => (Category::StrongBearishDivergence, 85, "strong sell signal"),
            IntensityBand::Moderate => (Category::ModerateBearishDivergence, 70, "sell signal"),
            IntensityBand::Weak => (Category::WeakBearishDivergence, 60, "weak signal, monitor"),
        };
        return Classification::new(category, confidence, Direction::Bearish, intensity, Tone::Bearish, text);
    }

    // Unreachable: both same-signed cases returned above.
    let confirmation = (after > 0.0 && after_to_pre > 0.0) || (after < 0.0 && after_to_pre < 0.0);
    if confirmation {
        let direction = Direction::from_sign(after);
        let (category, confidence, text) = match band {
            IntensityBand::Strong => (Category::StrongConfirmation, 95, "trend confirmed"),
            IntensityBand::Moderate => (Category::ModerateConfirmation, 80, "trend likely"),
            IntensityBand::Weak => (Category::WeakConfirmation, 65, "trend tentative"),
        };
        return Classification::new(category, confidence, direction, intensity, direction.into(), text);
    }

    Classification::new(
        Category::NeutralDivergence,
        50,
        Direction::Neutral,
        intensity,
        Tone::Neutral,
        "sessions disagree, wait for the open",
    )
}

fn closing_only(closing: f64) -> Classification {
    let magnitude = closing.abs();
    if magnitude < 0.1 {
        return Classification::new(
            Category::ClosingNeutral,
            30,
            Direction::Neutral,
            magnitude,
            Tone::Neutral,
            "waiting for data",
        );
    }
    let direction = Direction::from_sign(closing);
    let (category, confidence, text) = if magnitude < 1.0 {
        (Category::ClosingWeak, 40, lean_text(direction, false))
    } else {
        (Category::ClosingStrong, 50, lean_text(direction, true))
    };
    Classification::new(category, confidence, direction, magnitude, direction.into(), text)
}

fn after_only(after: f64) -> Classification {
    let magnitude = after.abs();
    if magnitude < 0.1 {
        return Classification::new(
            Category::AfterNeutral,
            60,
            Direction::Neutral,
            magnitude,
            Tone::Warning,
            "wait for pre-market confirmation",
        );
    }
    let direction = Direction::from_sign(after);
    let (category, confidence, text) = if magnitude < 1.0 {
        (Category::AfterWeak, 70, lean_text(direction, false))
    } else {
        (Category::AfterStrong, 85, lean_text(direction, true))
    };
    Classification::new(category, confidence, direction, magnitude, direction.into(), text)
}

fn same_direction(after: f64, after_to_pre: f64) -> Classification {
    let difference = (after - after_to_pre).abs();
    let intensity = after.abs() + after_to_pre.abs();
    let direction = Direction::from_sign(after);

    if difference < 0.5 {
        let text = match direction {
            Direction::Bullish => "strong buy signal",
            _ => "strong sell signal",
        };
        return Classification::new(
            Category::ConfirmedSameDirection,
            95,
            direction,
            intensity,
            direction.into(),
            text,
        );
    }

    if difference < 2.0 {
        let text = match direction {
            Direction::Bullish => "buy with caution",
            _ => "sell with caution",
        };
        return Classification::new(
            Category::WeakenedSameDirection,
            75,
            direction,
            intensity,
            Tone::Warning,
            text,
        );
    }

    Classification::new(
        Category::DivergenceIntensity,
        60,
        Direction::Neutral,
        intensity,
        Tone::Warning,
        "wait for confirmation",
    )
}

fn lean_text(direction: Direction, strong: bool) -> &'static str {
    match (direction, strong) {
        (Direction::Bullish, false) => "slight upward bias",
        (Direction::Bullish, true) => "strong upward bias",
        (Direction::Bearish, false) => "slight downward bias",
        (Direction::Bearish, true) => "strong downward bias",
        (Direction::Neutral, _) => "no bias",
    }
}
