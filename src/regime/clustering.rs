// =============================================================================
// Volatility Clustering Detector
// =============================================================================
//
// Tracks a short intraday series of average instrument volatility and looks
// for persistence through lag-1 autocorrelation:
//
//   rho = sum_{i=1}^{n-1} (x_i - mean)(x_{i-1} - mean)
//         / sum_{i=1}^{n-1} (x_i - mean)^2
//
// rho > 0.3 counts as clustering. A duration counter climbs while clustering
// persists and decays by one per quiet cycle, never below zero.
//
// This is the only state that survives between evaluation cycles. Updates are
// serialised through a single mutex: the autocorrelation reads the whole day
// bucket right after an append, so interleaved cycles would corrupt the
// duration counter.
//
// Timestamps are always passed in; the detector never reads the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::InputError;

/// Entries kept per calendar day (oldest evicted first).
pub const MAX_ENTRIES_PER_DAY: usize = 10;

/// Calendar days retained in the history.
pub const MAX_DAYS: usize = 5;

/// Entries needed before autocorrelation is attempted.
pub const MIN_SAMPLE: usize = 3;

/// Autocorrelation above this is clustering.
pub const CLUSTERING_THRESHOLD: f64 = 0.3;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityObservation {
    pub timestamp: DateTime<Utc>,
    pub avg_volatility: f64,
    pub max_volatility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringSignal {
    /// Strong persistence; dampen downstream weight.
    PersistentHighVolatility,
    ModerateClustering,
    /// Quiet tape without clustering; watch for a breakout.
    LowVolatility,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteringRecommendation {
    pub signal: ClusteringSignal,
    pub multiplier: f64,
}

impl ClusteringRecommendation {
    /// Advisory recommendation from the current intensity and average
    /// volatility.
    pub fn derive(intensity: f64, avg_volatility: f64, clustering: bool) -> Self {
        let (signal, multiplier) = if intensity > 1.5 {
            (ClusteringSignal::PersistentHighVolatility, 0.7)
        } else if intensity > 0.8 {
            (ClusteringSignal::ModerateClustering, 0.85)
        } else if avg_volatility < 0.5 && !clustering {
            (ClusteringSignal::LowVolatility, 1.1)
        } else {
            (ClusteringSignal::Normal, 1.0)
        };
        Self { signal, multiplier }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Autocorrelation cleared the threshold on this cycle.
    pub clustering: bool,
    /// Duration counter is positive.
    pub is_active: bool,
    pub intensity: f64,
    /// `None` while the day's sample is too short.
    pub autocorrelation: Option<f64>,
    /// `None` while the day's sample is too short.
    pub duration: Option<u32>,
    pub sample_size: usize,
    pub avg_volatility: f64,
    pub max_volatility: f64,
    pub recommendation: ClusteringRecommendation,
}

impl ClusteringResult {
    /// Result reported when there is no volatility reading at all.
    pub fn idle() -> Self {
        Self::warming_up(0, 0.0, 0.0)
    }

    fn warming_up(sample_size: usize, avg_volatility: f64, max_volatility: f64) -> Self {
        Self {
            clustering: false,
            is_active: false,
            intensity: 0.0,
            autocorrelation: None,
            duration: None,
            sample_size,
            avg_volatility,
            max_volatility,
            recommendation: ClusteringRecommendation::derive(0.0, avg_volatility, false),
        }
    }
}

// =============================================================================
// ClusteringState
// =============================================================================

/// Day-bucketed history plus the running duration counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusteringState {
    pub history: BTreeMap<NaiveDate, Vec<VolatilityObservation>>,
    pub duration: u32,
    pub is_active: bool,
    pub intensity: f64,
    pub last_result: Option<ClusteringResult>,
}

impl ClusteringState {
    /// Append an observation to its day bucket. Returns `false`, leaving the
    /// state untouched, when an entry with the same timestamp already exists.
    pub fn record_observation(&mut self, day: NaiveDate, obs: VolatilityObservation) -> bool {
        let bucket = self.history.entry(day).or_default();
        if bucket.iter().any(|e| e.timestamp == obs.timestamp) {
            return false;
        }

        bucket.push(obs);
        while bucket.len() > MAX_ENTRIES_PER_DAY {
            bucket.remove(0);
        }

        while self.history.len() > MAX_DAYS {
            self.history.pop_first();
        }
        true
    }

    /// Recompute clustering over `day`'s bucket and advance the counter.
    pub fn clustering_result(&mut self, day: NaiveDate, avg: f64, max: f64) -> ClusteringResult {
        let series: Vec<f64> = self
            .history
            .get(&day)
            .map(|b| b.iter().map(|e| e.avg_volatility).collect())
            .unwrap_or_default();

        let rho = match lag1_autocorrelation(&series) {
            Ok(rho) => rho,
            Err(e) => {
                trace!(error = %e, "clustering still warming up");
                let result = ClusteringResult::warming_up(series.len(), avg, max);
                self.last_result = Some(result.clone());
                return result;
            }
        };

        let clustering = rho > CLUSTERING_THRESHOLD;
        if clustering {
            self.intensity = (rho * 2.0).min(2.0);
            self.duration += 1;
        } else {
            self.intensity = 0.0;
            self.duration = self.duration.saturating_sub(1);
        }
        self.is_active = self.duration > 0;

        let result = ClusteringResult {
            clustering,
            is_active: self.is_active,
            intensity: self.intensity,
            autocorrelation: Some(rho),
            duration: Some(self.duration),
            sample_size: series.len(),
            avg_volatility: avg,
            max_volatility: max,
            recommendation: ClusteringRecommendation::derive(self.intensity, avg, clustering),
        };
        self.last_result = Some(result.clone());
        result
    }
}

// =============================================================================
// VolatilityClusteringDetector
// =============================================================================

pub struct VolatilityClusteringDetector {
    offset: FixedOffset,
    state: Mutex<ClusteringState>,
}

impl VolatilityClusteringDetector {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            state: Mutex::new(ClusteringState::default()),
        }
    }

    /// Detector keyed on calendar days at `hours` from UTC.
    pub fn with_utc_offset_hours(hours: i32) -> Result<Self, InputError> {
        let offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| {
            InputError::invalid("clustering_utc_offset_hours", format!("{hours}h out of range"))
        })?;
        Ok(Self::new(offset))
    }

    pub fn day_key(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Record one cycle's volatility and return the updated clustering read.
    ///
    /// A timestamp already in the history leaves the history and the counter
    /// untouched and returns the latest result, even when that result was
    /// produced by a later timestamp. Results are not memoized per timestamp.
    pub fn update(&self, avg_volatility: f64, max_volatility: f64, now: DateTime<Utc>) -> ClusteringResult {
        let day = self.day_key(now);
        let mut state = self.state.lock();

        let obs = VolatilityObservation {
            timestamp: now,
            avg_volatility,
            max_volatility,
        };
        if !state.record_observation(day, obs) {
            if let Some(previous) = state.last_result.clone() {
                trace!(%now, "duplicate clustering timestamp ignored");
                return previous;
            }
        }

        let result = state.clustering_result(day, avg_volatility, max_volatility);
        debug!(
            clustering = result.clustering,
            active = result.is_active,
            intensity = format!("{:.3}", result.intensity),
            duration = ?result.duration,
            samples = result.sample_size,
            "volatility clustering updated"
        );
        result
    }

    /// Latest result without recording anything.
    pub fn clustering_result(&self) -> Option<ClusteringResult> {
        self.state.lock().last_result.clone()
    }

    pub fn snapshot(&self) -> ClusteringState {
        self.state.lock().clone()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Lag-1 autocorrelation. A zero denominator yields 0.
pub fn lag1_autocorrelation(series: &[f64]) -> Result<f64, InputError> {
    if series.len() < MIN_SAMPLE {
        return Err(InputError::InsufficientSample {
            required: MIN_SAMPLE,
            available: series.len(),
        });
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 1..series.len() {
        numerator += (series[i] - mean) * (series[i - 1] - mean);
        denominator += (series[i] - mean).powi(2);
    }

    if denominator > 0.0 {
        let rho = numerator / denominator;
        if rho.is_finite() {
            return Ok(rho);
        }
    }
    Ok(0.0)
}
