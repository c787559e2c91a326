//! # altimon
//!
//! Orchestration of the altitude-change telemetry agent: the sampling loop,
//! the sync worker, and their shared shutdown.

pub mod pipeline;

pub use pipeline::{AgentStats, Orchestrator, OrchestratorConfig};
