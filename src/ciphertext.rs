//! Ciphertext handle and validity-proof codec.
//!
//! A [`CiphertextHandle`] is an opaque fixed-width reference to a value the
//! ledger stores confidentially; it never contains the value itself. The
//! all-zero handle means "absent" and must never enter the decryption
//! handshake. A fresh ciphertext travels with an [`InputProof`] binding it
//! to the exact `(contract, submitter)` pair it was built for, so a
//! ciphertext cannot be replayed against another contract or on behalf of
//! another submitter.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{decode_hex, Address};
use crate::error::GameError;

// ---------------------------------------------------------------------------
// CiphertextHandle
// ---------------------------------------------------------------------------

/// Opaque 32-byte reference to a confidentially stored value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    /// The all-zero handle, denoting "no ciphertext assigned yet".
    pub const ZERO: CiphertextHandle = CiphertextHandle([0u8; 32]);

    /// Whether this handle is the "absent" sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a `0x`-prefixed 64-digit hex string.
    pub fn parse(text: &str) -> Result<Self, GameError> {
        let stripped = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .ok_or_else(|| {
                GameError::InvalidInput(format!("handle missing 0x prefix: {text:?}"))
            })?;
        if stripped.len() != 64 {
            return Err(GameError::InvalidInput(format!(
                "handle must be 64 hex digits, got {}",
                stripped.len()
            )));
        }
        let mut bytes = [0u8; 32];
        decode_hex(stripped, &mut bytes)
            .map_err(|c| GameError::InvalidInput(format!("invalid hex digit {c:?} in handle")))?;
        Ok(CiphertextHandle(bytes))
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InputProof
// ---------------------------------------------------------------------------

/// Validity proof accompanying a freshly produced ciphertext.
///
/// Carries the binding digest tying the ciphertext to one
/// `(contract, submitter)` pair; a verifier recomputes the digest with the
/// identities it sees at verification time and rejects on mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof(pub Vec<u8>);

impl InputProof {
    /// Access the raw proof bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Binding digest for a fresh ciphertext: H(handle || contract || submitter).
pub fn binding_digest(
    handle: &CiphertextHandle,
    contract: &Address,
    submitter: &Address,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(handle.as_bytes());
    hasher.update(contract.as_bytes());
    hasher.update(submitter.as_bytes());
    hasher.finalize().into()
}

// ---------------------------------------------------------------------------
// EncryptedInput
// ---------------------------------------------------------------------------

/// A freshly encrypted value ready for one submission attempt.
///
/// Transient: valid only against the `(contract, submitter)` pair used to
/// construct it, consumed by a single `submit_encrypted_guess` call and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    /// Handle the encryption service registered for the fresh ciphertext.
    pub handle: CiphertextHandle,
    /// Validity proof binding the ciphertext to its construction identities.
    pub proof: InputProof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_handle_is_absent() {
        assert!(CiphertextHandle::ZERO.is_zero());
        assert!(!CiphertextHandle([1u8; 32]).is_zero());
    }

    #[test]
    fn handle_display_round_trips() {
        let handle = CiphertextHandle([0x5A; 32]);
        let text = handle.to_string();
        assert_eq!(text.len(), 2 + 64);
        assert_eq!(CiphertextHandle::parse(&text).unwrap(), handle);
    }

    #[test]
    fn handle_parse_rejects_malformed_text() {
        assert!(CiphertextHandle::parse("0x1234").is_err());
        assert!(CiphertextHandle::parse(&"ff".repeat(32)).is_err());
    }

    #[test]
    fn binding_digest_changes_with_either_identity() {
        let handle = CiphertextHandle([9u8; 32]);
        let contract_a = Address([1u8; 20]);
        let contract_b = Address([2u8; 20]);
        let submitter_a = Address([3u8; 20]);
        let submitter_b = Address([4u8; 20]);

        let base = binding_digest(&handle, &contract_a, &submitter_a);
        assert_ne!(base, binding_digest(&handle, &contract_b, &submitter_a));
        assert_ne!(base, binding_digest(&handle, &contract_a, &submitter_b));
        assert_eq!(base, binding_digest(&handle, &contract_a, &submitter_a));
    }
}
