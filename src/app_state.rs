// =============================================================================
// Central Application State — ADR Bias Service
// =============================================================================
//
// Ties the engine, its cache and the report history together and builds the
// serialisable snapshot served over REST and the WebSocket feed.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for the report history and error log.
//   - The engine manages its own interior mutability.
// =============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::EvaluationCache;
use crate::engine::{Engine, EvaluationReport, EvaluationSnapshot};
use crate::regime::clustering::ClusteringResult;
use crate::regime::volatility::VolatilityRegimeState;
use crate::runtime_config::EngineConfig;
use crate::signals::validation::LimitViolation;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Machine-readable kind, e.g. `input_limits` or `config_save`.
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// Config patch
// =============================================================================

/// Partial update of the tunable settings. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub sensitivity: Option<f64>,
    #[serde(default)]
    pub macro_weight_pct: Option<f64>,
    #[serde(default)]
    pub vix_weight_pct: Option<f64>,
    #[serde(default)]
    pub include_secondary: Option<bool>,
    #[serde(default)]
    pub auto_adjust_sensitivity: Option<bool>,
}

impl ConfigPatch {
    /// Apply onto `config`, returning a human-readable list of changes.
    pub fn apply(&self, config: &mut EngineConfig) -> Vec<String> {
        let mut changes = Vec::new();

        macro_rules! apply_field {
            ($field:ident) => {
                if let Some(val) = self.$field {
                    if config.$field != val {
                        changes.push(format!("{}: {} -> {}", stringify!($field), config.$field, val));
                        config.$field = val;
                    }
                }
            };
        }

        apply_field!(sensitivity);
        apply_field!(macro_weight_pct);
        apply_field!(vix_weight_pct);
        apply_field!(include_secondary);
        apply_field!(auto_adjust_sensitivity);

        changes
    }
}

// =============================================================================
// Evaluation outcome
// =============================================================================

#[derive(Debug)]
pub enum EvaluationOutcome {
    Evaluated { report: EvaluationReport, cached: bool },
    Rejected(Vec<LimitViolation>),
}

// =============================================================================
// AppState
// =============================================================================

const MAX_RECENT_ERRORS: usize = 50;
const MAX_RECENT_REPORTS: usize = 100;

/// Shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every meaningful state mutation. The WebSocket feed
    /// pushes whenever it moves.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Engine ──────────────────────────────────────────────────────────
    pub cache: EvaluationCache,
    config_path: PathBuf,
    /// Serialises config read-modify-write cycles.
    config_write: Mutex<()>,

    // ── Reports ─────────────────────────────────────────────────────────
    pub latest_report: RwLock<Option<EvaluationReport>>,
    pub recent_reports: RwLock<Vec<EvaluationReport>>,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: EngineConfig, config_path: impl Into<PathBuf>) -> Result<Self> {
        let engine = Engine::new(config).context("failed to build bias engine")?;

        Ok(Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),

            cache: EvaluationCache::new(Arc::new(engine)),
            config_path: config_path.into(),
            config_write: Mutex::new(()),

            latest_report: RwLock::new(None),
            recent_reports: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),

            start_time: std::time::Instant::now(),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        self.cache.engine()
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    /// Check the snapshot against the input limits, then evaluate it through
    /// the cache. Fresh reports become the latest and join the history.
    pub fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluationOutcome {
        let config = self.engine().config();
        let violations = config.input_limits.check_snapshot(snapshot, &config);
        if !violations.is_empty() {
            warn!(count = violations.len(), "snapshot rejected by input limits");
            let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
            self.push_error_with_code(
                format!("snapshot outside input limits: {}", fields.join(", ")),
                Some("input_limits".into()),
            );
            return EvaluationOutcome::Rejected(violations);
        }

        let cached = self.cache.evaluate(snapshot, Utc::now());
        if !cached.hit {
            self.push_report(cached.report.clone());
        }

        EvaluationOutcome::Evaluated {
            report: cached.report,
            cached: cached.hit,
        }
    }

    pub fn push_report(&self, report: EvaluationReport) {
        *self.latest_report.write() = Some(report.clone());

        let mut reports = self.recent_reports.write();
        reports.push(report);
        while reports.len() > MAX_RECENT_REPORTS {
            reports.remove(0);
        }
        drop(reports);

        self.increment_version();
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Apply a partial settings update, validate it and persist it.
    ///
    /// Returns the new config and the list of changes. Nothing is applied
    /// when validation fails.
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<(EngineConfig, Vec<String>)> {
        let _guard = self.config_write.lock();

        let mut config = self.engine().config();
        let changes = patch.apply(&mut config);
        if changes.is_empty() {
            return Ok((config, changes));
        }

        self.engine().update_config(config.clone())?;
        self.cache.clear();
        info!(changes = ?changes, "engine settings updated");

        if let Err(e) = config.save(&self.config_path) {
            warn!(error = %e, path = %self.config_path.display(), "failed to persist settings");
            self.push_error_with_code(format!("config save failed: {e:#}"), Some("config_save".into()));
        }

        self.increment_version();
        Ok((config, changes))
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Payload for `GET /api/v1/state` and the WebSocket feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let config = self.engine().config();
        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_s: self.start_time.elapsed().as_secs(),
            latest_report: self.latest_report.read().clone(),
            regime: self.engine().regime(),
            clustering: self.engine().clustering(),
            settings: SettingsSummary::from(&config),
            reports_stored: self.recent_reports.read().len(),
            cache_entries: self.cache.len(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_s: u64,
    pub latest_report: Option<EvaluationReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<VolatilityRegimeState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringResult>,

    pub settings: SettingsSummary,
    pub reports_stored: usize,
    pub cache_entries: usize,
    pub recent_errors: Vec<ErrorRecord>,
}

/// Tunable settings exposed by `GET /api/v1/config`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSummary {
    pub sensitivity: f64,
    pub macro_weight_pct: f64,
    pub vix_weight_pct: f64,
    pub include_secondary: bool,
    pub auto_adjust_sensitivity: bool,
    pub cache_ttl_ms: u64,
    pub clustering_utc_offset_hours: i32,
}

impl From<&EngineConfig> for SettingsSummary {
    fn from(c: &EngineConfig) -> Self {
        Self {
            sensitivity: c.sensitivity,
            macro_weight_pct: c.macro_weight_pct,
            vix_weight_pct: c.vix_weight_pct,
            include_secondary: c.include_secondary,
            auto_adjust_sensitivity: c.auto_adjust_sensitivity,
            cache_ttl_ms: c.cache_ttl_ms,
            clustering_utc_offset_hours: c.clustering_utc_offset_hours,
        }
    }
}
