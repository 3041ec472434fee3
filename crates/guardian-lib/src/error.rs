//! Error taxonomy for the guardian coordinator

use thiserror::Error;

/// Errors surfaced by the coordination engine
///
/// Detection and registry errors are logged and absorbed on the ingestion
/// path; remediation failures feed the retry/escalation state machine
/// instead of propagating to callers.
#[derive(Debug, Error)]
pub enum GuardianError {
    /// Node identity is malformed (empty or carries unresolved placeholders)
    #[error("invalid node identity: {0}")]
    InvalidIdentity(String),

    /// Referenced node or healing process is unknown
    #[error("not found: {0}")]
    NotFound(String),

    /// Healing was requested but no online mirror exists for the node
    #[error("no mirror available for node {0}")]
    NoMirrorAvailable(String),

    /// The target node has no live channel; caller decides severity
    #[error("no live channel for node {0}")]
    ChannelUnavailable(String),

    /// Node left the serving set while an operation was running
    #[error("node {0} is no longer online")]
    NodeUnavailable(String),

    /// Post-remediation verification did not confirm recovery
    #[error("verification failed for {node_id} ({strategy})")]
    VerificationFailed { node_id: String, strategy: String },

    /// Remediation retries were exhausted; an escalation was recorded
    #[error("retries exhausted for {node_id} ({strategy}) after {attempts} attempts")]
    RetriesExhausted {
        remediation_id: String,
        node_id: String,
        strategy: String,
        attempts: u32,
    },

    /// Mirror edge refused because it would close a cycle
    #[error("mirror edge {primary} -> {mirror} would create a cycle")]
    CycleRejected { primary: String, mirror: String },

    /// Credential did not verify; the message is dropped
    #[error("invalid credential")]
    InvalidCredential,

    /// Another healing process is already in progress for the node
    #[error("healing already in progress for node {0}")]
    HealingInProgress(String),
}

pub type Result<T> = std::result::Result<T, GuardianError>;
