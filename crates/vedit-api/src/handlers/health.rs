//! Liveness and readiness probes.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub timestamp: String,
}

/// Liveness: the process is up and serving HTTP.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "vedit",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub transport: TransportCheck,
}

#[derive(Serialize)]
pub struct TransportCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness: events can currently be emitted.
///
/// Returns 503 with `"degraded"` while the transport ping fails.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let start = Instant::now();
    let transport = match state.emitter.ping().await {
        Ok(()) => TransportCheck {
            ok: true,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => TransportCheck {
            ok: false,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    if transport.ok {
        (StatusCode::OK, Json(ReadinessResponse { status: "ready", transport }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse { status: "degraded", transport }),
        )
    }
}
