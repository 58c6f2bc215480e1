//! Membership error types

use crate::membership::types::Address;
use thiserror::Error;

/// Result type for membership operations
pub type Result<T> = std::result::Result<T, MembershipError>;

/// Membership errors
#[derive(Debug, Error)]
pub enum MembershipError {
    // ==================== Lifecycle Errors ====================
    #[error("initialization failed: {0}")]
    InitializationFailure(String),

    #[error("bootstrap failed: could not reach introducer {introducer}: {reason}")]
    BootstrapFailure { introducer: Address, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ==================== Protocol Errors ====================
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown message kind: {0}")]
    UnknownMessageKind(u32),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    // ==================== Network Errors ====================
    #[error("transport error: {0}")]
    Transport(String),

    // ==================== Runtime Errors ====================
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MembershipError {
    /// Check if this error must halt the node.
    ///
    /// Malformed or unknown messages and failed sends are dropped and logged;
    /// everything else leaves the node unable to continue consistently.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MembershipError::MalformedMessage(_)
                | MembershipError::UnknownMessageKind(_)
                | MembershipError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(!MembershipError::MalformedMessage("short".into()).is_fatal());
        assert!(!MembershipError::UnknownMessageKind(9).is_fatal());
        assert!(!MembershipError::Transport("closed".into()).is_fatal());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(MembershipError::InvariantViolation("no self".into()).is_fatal());
        assert!(MembershipError::InitializationFailure("twice".into()).is_fatal());
        assert!(
            MembershipError::BootstrapFailure {
                introducer: Address::new(1, 0),
                reason: "unreachable".into(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_bootstrap_message_names_introducer() {
        let err = MembershipError::BootstrapFailure {
            introducer: Address::new(1, 0),
            reason: "no route".into(),
        };
        assert!(err.to_string().contains("1:0"));
    }
}
