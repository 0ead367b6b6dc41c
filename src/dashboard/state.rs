//! Shared application state for the dashboard.
//!
//! One `DashboardState` is shared across all handlers: the engine
//! supervisor for process control and the broadcast hub for live clients.
//! The two own their state independently and never touch each other's.

use crate::hub::BroadcastHub;
use crate::supervisor::EngineSupervisor;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared dashboard state.
pub struct DashboardState {
    /// Lifecycle of the external trading-engine process.
    pub supervisor: EngineSupervisor,

    /// Registry and fan-out for connected WebSocket clients.
    pub hub: BroadcastHub,
}

impl DashboardState {
    pub fn new(engine_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            supervisor: EngineSupervisor::new(engine_path),
            hub: BroadcastHub::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_starts_idle_and_empty() {
        let state = DashboardState::new("build/engine");
        assert!(!state.supervisor.status().await.running);
        assert_eq!(state.hub.client_count().await, 0);
    }
}
