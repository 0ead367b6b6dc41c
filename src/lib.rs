//! Trading Engine Dashboard
//!
//! A web dashboard for an external trading engine: launches and stops the
//! engine executable on request, and relays telemetry pushed into the
//! system out to connected browser clients in real time.

pub mod config;
pub mod dashboard;
pub mod hub;
pub mod supervisor;
