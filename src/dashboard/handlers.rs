//! HTTP route handlers for the dashboard.
//!
//! Engine control (start/stop/status), the telemetry ingestion endpoint,
//! the embedded index page, and the health check. Supervisor errors map to
//! distinct HTTP classes: `AlreadyRunning` is a conflict, a missing
//! executable is not-found, a startup failure is a server error.

use crate::config::DEFAULT_DURATION_SECS;
use crate::dashboard::state::DashboardState;
use crate::supervisor::SupervisorError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// PAGES
// ============================================================================

/// Main dashboard page
pub async fn index_page() -> impl IntoResponse {
    Html(include_str!("../../static/index.html"))
}

// ============================================================================
// ENGINE CONTROL
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default = "default_duration")]
    pub duration: i64,
}

fn default_duration() -> i64 {
    DEFAULT_DURATION_SECS as i64
}

#[derive(Debug, Serialize)]
pub struct EngineActionResponse {
    pub status: &'static str,
    pub pid: u32,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EngineErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl EngineErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            pid: None,
            stdout: None,
            stderr: None,
        }
    }
}

/// Start the trading engine with the requested duration.
///
/// A missing or malformed body falls back to the default duration, matching
/// the lenient contract the engine's callers rely on.
pub async fn api_engine_start(
    State(state): State<Arc<DashboardState>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let duration = body
        .map(|Json(req)| req.duration)
        .unwrap_or(DEFAULT_DURATION_SECS as i64);

    if duration <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(EngineErrorResponse::message(
                "duration must be greater than zero",
            )),
        )
            .into_response();
    }

    match state.supervisor.start(duration as u64).await {
        Ok(pid) => Json(EngineActionResponse {
            status: "started",
            pid,
            message: "Engine started successfully",
        })
        .into_response(),
        Err(err) => supervisor_error_response(err),
    }
}

/// Stop the trading engine
pub async fn api_engine_stop(State(state): State<Arc<DashboardState>>) -> Response {
    match state.supervisor.stop().await {
        Ok(pid) => Json(EngineActionResponse {
            status: "stopped",
            pid,
            message: "Engine stopped successfully",
        })
        .into_response(),
        Err(err) => supervisor_error_response(err),
    }
}

#[derive(Debug, Serialize)]
pub struct EngineStatusResponse {
    pub running: bool,
    pub pid: Option<u32>,
    pub engine_path: String,
    pub duration: u64,
    pub elapsed_ms: f64,
    pub time_remaining: f64,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Current engine status with derived timing fields
pub async fn api_engine_status(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let status = state.supervisor.status().await;
    Json(EngineStatusResponse {
        running: status.running,
        pid: status.pid,
        engine_path: state.supervisor.engine_path().display().to_string(),
        duration: status.duration,
        elapsed_ms: status.elapsed_ms,
        time_remaining: status.time_remaining,
        progress_percent: status.progress_percent,
        started_at: status.started_at,
    })
}

/// Map a supervisor error to its HTTP status class.
fn supervisor_error_response(err: SupervisorError) -> Response {
    let (code, body) = supervisor_error_parts(err);
    (code, Json(body)).into_response()
}

fn supervisor_error_parts(err: SupervisorError) -> (StatusCode, EngineErrorResponse) {
    match err {
        SupervisorError::AlreadyRunning { pid } => (
            StatusCode::CONFLICT,
            EngineErrorResponse {
                pid: Some(pid),
                ..EngineErrorResponse::message("Engine is already running")
            },
        ),
        SupervisorError::NotRunning => (
            StatusCode::BAD_REQUEST,
            EngineErrorResponse::message("Engine is not running"),
        ),
        SupervisorError::ExecutableNotFound { path } => (
            StatusCode::NOT_FOUND,
            EngineErrorResponse::message(format!(
                "Engine executable not found at {}",
                path.display()
            )),
        ),
        SupervisorError::StartupFailed { stdout, stderr } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            EngineErrorResponse {
                stdout: Some(stdout),
                stderr: Some(stderr),
                ..EngineErrorResponse::message("Engine failed to start")
            },
        ),
        SupervisorError::Io(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            EngineErrorResponse::message(format!("Engine control failed: {e}")),
        ),
    }
}

// ============================================================================
// TELEMETRY INGESTION
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Accept a telemetry payload from the engine and fan it out to every
/// connected WebSocket client. The payload is opaque: it is re-serialized
/// as-is and the producer never learns about per-client failures.
pub async fn api_broadcast(
    State(state): State<Arc<DashboardState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.hub.broadcast(&payload.to_string()).await;
    Json(BroadcastResponse {
        status: "success",
        message: "Data broadcasted",
    })
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub live_clients: usize,
}

static START_TIME: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

pub async fn health_check(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let start = START_TIME.get_or_init(std::time::Instant::now);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: start.elapsed().as_secs(),
        live_clients: state.hub.client_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_status_classes() {
        let (code, body) = supervisor_error_parts(SupervisorError::AlreadyRunning { pid: 42 });
        assert_eq!(code, StatusCode::CONFLICT);
        assert_eq!(body.pid, Some(42));

        let (code, _) = supervisor_error_parts(SupervisorError::NotRunning);
        assert_eq!(code, StatusCode::BAD_REQUEST);

        let (code, _) = supervisor_error_parts(SupervisorError::ExecutableNotFound {
            path: PathBuf::from("build/engine"),
        });
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (code, body) = supervisor_error_parts(SupervisorError::StartupFailed {
            stdout: "out".into(),
            stderr: "err".into(),
        });
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.stderr.as_deref(), Some("err"));
    }

    #[test]
    fn test_error_response_omits_empty_fields() {
        let body = EngineErrorResponse::message("Engine is not running");
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("pid"));
        assert!(!json.contains("stdout"));
    }

    #[test]
    fn test_status_payload_shape() {
        let response = EngineStatusResponse {
            running: true,
            pid: Some(7),
            engine_path: "build/engine".to_string(),
            duration: 10,
            elapsed_ms: 5000.0,
            time_remaining: 5.0,
            progress_percent: 50.0,
            started_at: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["pid"], 7);
        assert_eq!(json["engine_path"], "build/engine");
        assert_eq!(json["duration"], 10);
        assert_eq!(json["elapsed_ms"], 5000.0);
        assert_eq!(json["time_remaining"], 5.0);
        assert_eq!(json["progress_percent"], 50.0);
        assert!(json.get("started_at").is_none());
    }

    #[test]
    fn test_start_request_defaults_duration() {
        let req: StartRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.duration, DEFAULT_DURATION_SECS as i64);

        let req: StartRequest = serde_json::from_str(r#"{"duration": 60}"#).unwrap();
        assert_eq!(req.duration, 60);
    }
}
