//! Web Dashboard Module
//!
//! This module provides the web surface for monitoring and controlling the
//! trading engine. Built with Axum.
//!
//! # Features
//!
//! - **Engine Control**: start/stop the external engine with a run duration,
//!   plus a status endpoint with derived progress
//! - **Real-time Updates**: WebSocket streaming of telemetry pushed in via
//!   the broadcast endpoint
//! - **Health Check**: uptime, version, and connected-client count
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_dashboard::dashboard::{DashboardConfig, DashboardServer, DashboardState};
//!
//! let config = DashboardConfig::from_env();
//! let state = DashboardState::new(config.engine_path.clone());
//! DashboardServer::with_config(state, config).run().await?;
//! ```

pub mod handlers;
pub mod server;
pub mod state;
pub mod ws;

pub use server::{DashboardConfig, DashboardServer};
pub use state::DashboardState;
