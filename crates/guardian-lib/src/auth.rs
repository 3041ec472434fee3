//! Credential verification at the message boundary
//!
//! Every inbound message carries an opaque credential token; the verifier
//! maps it to a node identity or rejects it. Messages with invalid
//! credentials are dropped before any state is touched.

use crate::error::{GuardianError, Result};
use dashmap::DashMap;

/// Verified sender identity attached to an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub node_id: String,
}

/// Maps credential tokens to node identities
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity>;
}

/// Static token table, loaded from configuration at startup
#[derive(Default)]
pub struct StaticVerifier {
    tokens: DashMap<String, String>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: impl Into<String>, node_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), node_id.into());
        self
    }

    pub fn add_token(&self, token: impl Into<String>, node_id: impl Into<String>) {
        self.tokens.insert(token.into(), node_id.into());
    }
}

impl CredentialVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Result<Identity> {
        self.tokens
            .get(token)
            .map(|entry| Identity {
                node_id: entry.value().clone(),
            })
            .ok_or(GuardianError::InvalidCredential)
    }
}

/// Accepts any non-empty token as the identity it claims
///
/// For closed deployments and tests; the token itself is taken as the
/// node id.
#[derive(Default)]
pub struct PermissiveVerifier;

impl CredentialVerifier for PermissiveVerifier {
    fn verify(&self, token: &str) -> Result<Identity> {
        if token.is_empty() {
            return Err(GuardianError::InvalidCredential);
        }
        Ok(Identity {
            node_id: token.to_string(),
        })
    }
}
