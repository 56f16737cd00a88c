// =============================================================================
// Engine Configuration — tunable settings with atomic save
// =============================================================================
//
// Central configuration for the bias engine: the manual sensitivity, the
// macro / volatility-index weight fractions, feature flags, and the static
// instrument universe.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
//
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signals::validation::InputLimits;
use crate::types::{Instrument, MacroIndicator};
use crate::universe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_sensitivity() -> f64 {
    1.0
}

fn default_macro_weight_pct() -> f64 {
    25.0
}

fn default_vix_weight_pct() -> f64 {
    10.0
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

fn default_clustering_utc_offset_hours() -> i32 {
    -3
}

fn default_volatility_index_level() -> f64 {
    20.0
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the bias engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Manual controls -----------------------------------------------------

    /// Manual sensitivity multiplier, bounded to [0.1, 2.0] when applied.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Macro-indicator weight as a percentage of the total.
    #[serde(default = "default_macro_weight_pct")]
    pub macro_weight_pct: f64,

    /// Volatility-index weight as a percentage of the total.
    #[serde(default = "default_vix_weight_pct")]
    pub vix_weight_pct: f64,

    // --- Feature flags -------------------------------------------------------

    /// Include the secondary instrument set in aggregation.
    #[serde(default = "default_true")]
    pub include_secondary: bool,

    /// Cap the sensitivity by the volatility-index limit and apply the
    /// volatility-index confidence adjustment.
    #[serde(default = "default_true")]
    pub auto_adjust_sensitivity: bool,

    // --- Engine internals ----------------------------------------------------

    /// Lifetime of a memoized evaluation.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Fixed timezone used for the clustering detector's calendar-day key.
    #[serde(default = "default_clustering_utc_offset_hours")]
    pub clustering_utc_offset_hours: i32,

    /// Level assumed for regime classification when none is observed.
    #[serde(default = "default_volatility_index_level")]
    pub default_volatility_index_level: f64,

    /// Edit-boundary limits enforced before an evaluation runs.
    #[serde(default)]
    pub input_limits: InputLimits,

    // --- Static universe -----------------------------------------------------

    #[serde(default = "universe::default_primary")]
    pub primary: Vec<Instrument>,

    #[serde(default = "universe::default_secondary")]
    pub secondary: Vec<Instrument>,

    #[serde(default = "universe::default_macro_indicators")]
    pub macro_indicators: Vec<MacroIndicator>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
            macro_weight_pct: default_macro_weight_pct(),
            vix_weight_pct: default_vix_weight_pct(),
            include_secondary: true,
            auto_adjust_sensitivity: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            clustering_utc_offset_hours: default_clustering_utc_offset_hours(),
            default_volatility_index_level: default_volatility_index_level(),
            input_limits: InputLimits::default(),
            primary: universe::default_primary(),
            secondary: universe::default_secondary(),
            macro_indicators: universe::default_macro_indicators(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            primary = config.primary.len(),
            secondary = config.secondary.len(),
            macro_indicators = config.macro_indicators.len(),
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Reject corrupt static configuration. This is the only hard failure in
    /// the engine: everything downstream assumes a sane universe.
    pub fn validate(&self) -> Result<()> {
        if self.primary.is_empty() {
            bail!("primary instrument set is empty");
        }

        let mut seen = HashSet::new();
        for inst in self.primary.iter().chain(self.secondary.iter()) {
            if inst.ticker.trim().is_empty() {
                bail!("instrument with empty ticker");
            }
            if !seen.insert(inst.ticker.as_str()) {
                bail!("duplicate instrument ticker {}", inst.ticker);
            }
            if !(inst.index_weight.is_finite() && inst.index_weight > 0.0 && inst.index_weight <= 100.0) {
                bail!("{}: index weight {} outside (0, 100]", inst.ticker, inst.index_weight);
            }
            if !(inst.liquidity_weight.is_finite()
                && inst.liquidity_weight > 0.0
                && inst.liquidity_weight <= 1.0)
            {
                bail!(
                    "{}: liquidity weight {} outside (0, 1]",
                    inst.ticker,
                    inst.liquidity_weight
                );
            }
        }
        if self.primary.iter().any(|i| i.is_secondary) {
            bail!("primary set contains an instrument flagged secondary");
        }
        if self.secondary.iter().any(|i| !i.is_secondary) {
            bail!("secondary set contains an instrument not flagged secondary");
        }

        let mut macro_seen = HashSet::new();
        for ind in &self.macro_indicators {
            if !macro_seen.insert(ind.ticker.as_str()) {
                bail!("duplicate macro indicator {}", ind.ticker);
            }
            if !(ind.weight.is_finite() && ind.weight >= 0.0) {
                bail!("{}: macro weight {} is invalid", ind.ticker, ind.weight);
            }
        }

        if !self.default_volatility_index_level.is_finite() {
            bail!("default volatility index level must be finite");
        }
        if !(-12..=14).contains(&self.clustering_utc_offset_hours) {
            bail!(
                "clustering UTC offset {}h outside [-12, 14]",
                self.clustering_utc_offset_hours
            );
        }

        self.input_limits.check_settings(self)?;
        Ok(())
    }

    /// The instruments taking part in aggregation under the current flags.
    pub fn active_instruments(&self) -> impl Iterator<Item = &Instrument> {
        let secondary: &[Instrument] = if self.include_secondary {
            &self.secondary
        } else {
            &[]
        };
        self.primary.iter().chain(secondary.iter())
    }
}
