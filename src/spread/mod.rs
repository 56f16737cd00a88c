// =============================================================================
// Spread Module
// =============================================================================
//
// Per-instrument price path analysis:
// - Reconstruction of close -> after-market -> pre-market prices and spreads
// - Divergence classification of the two sequential session moves

pub mod classifier;
pub mod reconstruct;

pub use classifier::{classify, classify_divergence, Category, Classification, ValidationBucket};
pub use reconstruct::{reconstruct, SpreadAnalysis};
