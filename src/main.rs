//! Trading Engine Dashboard
//!
//! Serves the dashboard UI, the engine control API, and the live telemetry
//! stream. The external engine pushes data to `POST /api/broadcast`; every
//! connected WebSocket client on `/ws` receives it.

use anyhow::Result;
use tracing::info;
use trading_dashboard::dashboard::{DashboardConfig, DashboardServer, DashboardState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trading_dashboard=info".parse()?),
        )
        .init();

    let config = DashboardConfig::from_env();

    info!("Trading Engine Dashboard v{}", env!("CARGO_PKG_VERSION"));
    info!("   Engine executable: {}", config.engine_path.display());
    info!("   Listening on: {}:{}", config.host, config.port);

    let state = DashboardState::new(config.engine_path.clone());
    DashboardServer::with_config(state, config).run().await
}
