//! Failure taxonomy for the confidential session protocol.
//!
//! Every failure carries a specific kind plus human-readable detail; nothing
//! is retried internally. A failed operation leaves the session exactly as
//! it was before the attempt, and the caller decides whether to re-invoke.

use serde::{Deserialize, Serialize};

use crate::ciphertext::CiphertextHandle;

/// Errors surfaced by the session protocol and its collaborator seams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GameError {
    /// An illegal state transition was attempted locally. Never reaches a
    /// collaborator.
    #[error("precondition violation: {0}")]
    PreconditionViolation(String),

    /// Malformed identity or out-of-range guess.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The encryption capability could not be reached while building an
    /// encrypted input.
    #[error("encryption service unavailable: {0}")]
    EncryptionServiceUnavailable(String),

    /// The key custody collaborator was missing or declined to sign.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    /// The decryption service was unreachable or rejected the grant.
    #[error("decryption service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The decryption service responded without a plaintext for this
    /// handle. The whole handshake fails; no partial map is returned.
    #[error("decryption failed for handle {0}")]
    DecryptionFailed(CiphertextHandle),

    /// The ledger rejected or reverted a write.
    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    /// The ledger could not be reached for a read.
    #[error("ledger unreachable: {0}")]
    LedgerUnreachable(String),
}

impl GameError {
    /// Short stable identifier for audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PreconditionViolation(_) => "precondition-violation",
            Self::InvalidInput(_) => "invalid-input",
            Self::EncryptionServiceUnavailable(_) => "encryption-service-unavailable",
            Self::SignerUnavailable(_) => "signer-unavailable",
            Self::ServiceUnavailable(_) => "service-unavailable",
            Self::DecryptionFailed(_) => "decryption-failed",
            Self::LedgerWriteFailed(_) => "ledger-write-failed",
            Self::LedgerUnreachable(_) => "ledger-unreachable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = GameError::PreconditionViolation("start while active".to_string());
        assert_eq!(
            err.to_string(),
            "precondition violation: start while active"
        );
    }

    #[test]
    fn decryption_failed_names_the_handle() {
        let handle = CiphertextHandle([7u8; 32]);
        let err = GameError::DecryptionFailed(handle);
        assert!(err.to_string().contains(&handle.to_string()));
        assert_eq!(err.kind(), "decryption-failed");
    }
}
