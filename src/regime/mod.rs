// =============================================================================
// Regime Module
// =============================================================================
//
// Volatility context for the bias signal:
// - Volatility regime (index level + cross-sectional dispersion)
// - Volatility clustering (lag-1 autocorrelation, the only cross-cycle state)
// - Volatility-index sensitivity policy

pub mod clustering;
pub mod vix;
pub mod volatility;

pub use clustering::{ClusteringResult, ClusteringState, VolatilityClusteringDetector};
pub use vix::{effective_sensitivity, sensitivity_limit, SensitivityLimit, SensitivityStatus};
pub use volatility::{VolatilityRegime, VolatilityRegimeEngine, VolatilityRegimeState};
