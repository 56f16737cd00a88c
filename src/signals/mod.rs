// =============================================================================
// Signals Module
// =============================================================================
//
// Signal computation for the bias engine:
// - Input validation (core validator + edit-boundary limits)
// - Information-ratio instrument weighting
// - Weighted aggregation of instrument, macro and volatility-index terms
// - Confidence scoring
// - Interpretation and session timing

pub mod aggregator;
pub mod confidence;
pub mod information_ratio;
pub mod interpretation;
pub mod timing;
pub mod validation;

pub use aggregator::{AggregationParams, AggregationResult, WeightedAggregator};
pub use confidence::{ConfidenceScore, ConfidenceScorer};
pub use information_ratio::InformationRatio;
pub use interpretation::{interpret, BiasLevel, ConfidenceBand, Interpretation};
pub use timing::TimingEffect;
pub use validation::InputLimits;
