//! Fixed defaults for the dashboard.
//!
//! Environment overrides live in
//! [`DashboardConfig::from_env`](crate::dashboard::DashboardConfig::from_env).

/// Default location of the trading-engine executable, relative to the
/// working directory.
pub const DEFAULT_ENGINE_PATH: &str = "build/Debug/simple_as_engine";

/// Default simulation duration in seconds when a start request omits one.
pub const DEFAULT_DURATION_SECS: u64 = 120;

/// Default dashboard port
pub const DEFAULT_DASHBOARD_PORT: u16 = 8080;
