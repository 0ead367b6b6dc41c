//! Axum server setup and configuration.
//!
//! This module provides the dashboard server with all routes configured,
//! CORS middleware, static file serving, and graceful shutdown support.

use crate::config::{DEFAULT_DASHBOARD_PORT, DEFAULT_ENGINE_PATH};
use crate::dashboard::handlers::{
    api_broadcast, api_engine_start, api_engine_status, api_engine_stop, health_check, index_page,
};
use crate::dashboard::state::DashboardState;
use crate::dashboard::ws::ws_endpoint;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

/// Dashboard server configuration
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Path to static files directory
    pub static_dir: PathBuf,
    /// Enable CORS for development
    pub enable_cors: bool,
    /// Path to the trading-engine executable
    pub engine_path: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DASHBOARD_PORT,
            host: "127.0.0.1".to_string(),
            static_dir: PathBuf::from("static"),
            enable_cors: true,
            engine_path: PathBuf::from(DEFAULT_ENGINE_PATH),
        }
    }
}

impl DashboardConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("DASHBOARD_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DASHBOARD_PORT),
            host: std::env::var("DASHBOARD_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            static_dir: std::env::var("DASHBOARD_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            enable_cors: std::env::var("DASHBOARD_CORS")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(true),
            engine_path: std::env::var("ENGINE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENGINE_PATH)),
        }
    }
}

/// Dashboard server
pub struct DashboardServer {
    state: Arc<DashboardState>,
    config: DashboardConfig,
}

impl DashboardServer {
    /// Create a new dashboard server with state
    pub fn new(state: Arc<DashboardState>) -> Self {
        Self {
            state,
            config: DashboardConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(state: Arc<DashboardState>, config: DashboardConfig) -> Self {
        Self { state, config }
    }

    /// Path of the engine executable actually under supervision. The state
    /// is the source of truth; `config.engine_path` only feeds construction.
    fn engine_path(&self) -> &std::path::Path {
        self.state.supervisor.engine_path()
    }

    /// Build the router with all routes
    fn build_router(&self) -> Router {
        let cors = if self.config.enable_cors {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        } else {
            CorsLayer::new()
        };

        let static_service =
            ServeDir::new(&self.config.static_dir).append_index_html_on_directories(true);

        Router::new()
            // Dashboard page
            .route("/", get(index_page))
            // Live telemetry
            .route("/ws", get(ws_endpoint))
            .route("/api/broadcast", post(api_broadcast))
            // Engine control
            .route("/api/engine/start", post(api_engine_start))
            .route("/api/engine/stop", post(api_engine_stop))
            .route("/api/engine/status", get(api_engine_status))
            // Health check
            .route("/health", get(health_check))
            // Static assets
            .nest_service("/static", static_service)
            // Add state and middleware
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        info!("Starting dashboard server at http://{}", addr);
        info!("Engine executable: {}", self.engine_path().display());

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Dashboard ready at http://{}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Dashboard server shut down");
        Ok(())
    }
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.port, DEFAULT_DASHBOARD_PORT);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.enable_cors);
        assert_eq!(config.engine_path, PathBuf::from(DEFAULT_ENGINE_PATH));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let state = DashboardState::new(DEFAULT_ENGINE_PATH);
        let server = DashboardServer::new(state);
        let _router = server.build_router();
        // Router should build without panicking
    }

    #[tokio::test]
    async fn test_server_reports_supervised_engine_path() {
        // State and config deliberately disagree; the supervised path wins.
        let state = DashboardState::new("build/real_engine");
        let config = DashboardConfig {
            engine_path: PathBuf::from("build/stale_engine"),
            ..DashboardConfig::default()
        };
        let server = DashboardServer::with_config(state, config);

        assert_eq!(server.engine_path(), PathBuf::from("build/real_engine"));
    }
}
