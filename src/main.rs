// =============================================================================
// ADR Bias Service — Main Entry Point
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adr_bias_engine::api;
use adr_bias_engine::api::auth::ADMIN_TOKEN_ENV;
use adr_bias_engine::app_state::AppState;
use adr_bias_engine::runtime_config::EngineConfig;

const DEFAULT_CONFIG_PATH: &str = "engine_config.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("ADR bias service starting up");

    let config_path = PathBuf::from(
        std::env::var("BIAS_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );
    let config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path.display(), "Failed to load config, using defaults");
        EngineConfig::default()
    });

    info!(
        sensitivity = config.sensitivity,
        macro_weight_pct = config.macro_weight_pct,
        vix_weight_pct = config.vix_weight_pct,
        include_secondary = config.include_secondary,
        auto_adjust = config.auto_adjust_sensitivity,
        cache_ttl_ms = config.cache_ttl_ms,
        "Engine settings"
    );

    if std::env::var(ADMIN_TOKEN_ENV).map_or(true, |t| t.is_empty()) {
        warn!("{ADMIN_TOKEN_ENV} is not set, every authenticated endpoint will answer 403");
    }

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, config_path)?);

    // ── 3. Start the API server ──────────────────────────────────────────
    let bind_addr =
        std::env::var("BIAS_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown signal received, stopping gracefully");
            }
        })
        .await?;

    info!("ADR bias service stopped");
    Ok(())
}
