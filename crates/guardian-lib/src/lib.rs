//! Guardian library for fleet coordination
//!
//! This crate provides the core functionality for:
//! - Node registration and heartbeat liveness tracking
//! - Statistical, rule, and pattern anomaly detection
//! - Outbound message routing to nodes and observers
//! - Bounded remediation with escalation
//! - Mirror-based self-healing
//! - Health checks and observability

pub mod advisor;
pub mod auth;
pub mod coordinator;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fabric;
pub mod health;
pub mod models;
pub mod observability;
pub mod persistence;
pub mod protocol;
pub mod registry;
pub mod remediation;

pub use engine::{EngineConfig, Guardian};
pub use error::{GuardianError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{GuardianMetrics, StructuredLogger};
pub use protocol::{InboundMessage, OutboundMessage};
