// =============================================================================
// ADR Bias Engine
// =============================================================================
//
// Directional bias for the Brazilian index open, read from the after-market
// and pre-market moves of its US-listed depositary receipts, a basket of
// macro indicators and a volatility index.
//
//   spread   price-path reconstruction and divergence classification
//   regime   volatility regime, volatility-index policy, clustering
//   signals  validation, weighting, aggregation, confidence, interpretation
//   engine   one evaluation cycle from snapshot to report
//   cache    short-lived memoization keyed by the snapshot fingerprint
//   api      Axum REST + WebSocket surface over `AppState`
// =============================================================================

pub mod api;
pub mod app_state;
pub mod cache;
pub mod engine;
pub mod errors;
pub mod regime;
pub mod runtime_config;
pub mod signals;
pub mod spread;
pub mod types;
pub mod universe;

pub use engine::{Engine, EvaluationReport, EvaluationSnapshot};
pub use errors::{InputError, InputIssue};
pub use runtime_config::EngineConfig;
