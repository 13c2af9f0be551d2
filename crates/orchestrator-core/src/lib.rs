//! Ambient utilities shared by the orchestrator crates: logging setup,
//! build metadata and graceful shutdown. Split out of `cloudorch` so the
//! core library stays free of process-wide globals.

pub mod signal;
pub mod telemetry;
pub mod version;
