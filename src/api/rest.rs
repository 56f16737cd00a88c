// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Health is public; everything else
// requires a valid Bearer token checked via the `AuthBearer` extractor.
//
// CORS is permissive; tighten `allow_origin` for a public deployment.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::{AppState, ConfigPatch, EvaluationOutcome, SettingsSummary};
use crate::engine::{EvaluationReport, EvaluationSnapshot};

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/evaluate", axum::routing::post(evaluate))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/reports", get(reports))
        .route("/api/v1/config", get(get_config).post(set_config))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Evaluation (authenticated)
// =============================================================================

#[derive(Serialize)]
struct EvaluateResponse {
    cached: bool,
    state_version: u64,
    report: EvaluationReport,
}

async fn evaluate(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<EvaluationSnapshot>,
) -> impl IntoResponse {
    match state.evaluate(&snapshot) {
        EvaluationOutcome::Evaluated { report, cached } => Json(EvaluateResponse {
            cached,
            state_version: state.current_state_version(),
            report,
        })
        .into_response(),
        EvaluationOutcome::Rejected(violations) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": "snapshot outside input limits",
                "violations": violations,
            })),
        )
            .into_response(),
    }
}

// =============================================================================
// State and history (authenticated)
// =============================================================================

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn reports(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let reports = state.recent_reports.read().clone();
    Json(reports)
}

// =============================================================================
// Settings (authenticated)
// =============================================================================

async fn get_config(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SettingsSummary::from(&state.engine().config()))
}

#[derive(Serialize)]
struct ConfigResponse {
    settings: SettingsSummary,
    changes: Vec<String>,
}

async fn set_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ConfigPatch>,
) -> impl IntoResponse {
    match state.update_config(&patch) {
        Ok((config, changes)) => {
            if !changes.is_empty() {
                info!(changes = ?changes, "settings updated via API");
            }
            Json(ConfigResponse {
                settings: SettingsSummary::from(&config),
                changes,
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "settings update rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("{e:#}") })),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::ADMIN_TOKEN_ENV;
    use crate::runtime_config::EngineConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const TOKEN: &str = "test-admin-token";

    fn app() -> Router {
        std::env::set_var(ADMIN_TOKEN_ENV, TOKEN);
        let path = std::env::temp_dir().join(format!("bias-api-{}.json", uuid::Uuid::new_v4()));
        let state = AppState::new(EngineConfig::default(), path).unwrap();
        router(Arc::new(state))
    }

    fn post_json(uri: &str, body: serde_json::Value, token: Option<&str>) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn snapshot_body() -> serde_json::Value {
        serde_json::json!({
            "observations": {
                "VALE": { "closing_price": 60.0, "after_market_pct": 1.0, "pre_market_pct": 0.5 },
                "ITUB": { "closing_price": 6.0, "after_market_pct": -0.4, "pre_market_pct": -0.2 }
            },
            "macro_values": { "EWZ_CLOSE": 0.8 },
            "volatility_index": { "level": 18.0, "change_pct": -2.0 }
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let resp = app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn evaluate_requires_token() {
        let resp = app()
            .oneshot(post_json("/api/v1/evaluate", snapshot_body(), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app()
            .oneshot(post_json("/api/v1/evaluate", snapshot_body(), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn evaluate_returns_report() {
        let resp = app()
            .oneshot(post_json("/api/v1/evaluate", snapshot_body(), Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["cached"], false);
        assert!(json["report"]["signal"].is_number());
        assert_eq!(json["report"]["instruments"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn out_of_limit_snapshot_is_unprocessable() {
        let mut body = snapshot_body();
        body["volatility_index"]["level"] = serde_json::json!(95.0);
        let resp = app()
            .oneshot(post_json("/api/v1/evaluate", body, Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["violations"][0]["field"], "volatility_index.level");
    }

    #[tokio::test]
    async fn config_update_round_trip() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/config",
                serde_json::json!({ "macro_weight_pct": 30.0 }),
                Some(TOKEN),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["settings"]["macro_weight_pct"], 30.0);
        assert_eq!(json["changes"].as_array().unwrap().len(), 1);

        let resp = app
            .oneshot(post_json(
                "/api/v1/config",
                serde_json::json!({ "sensitivity": 9.0 }),
                Some(TOKEN),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
