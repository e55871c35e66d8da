//! External collaborator seams.
//!
//! The protocol core never talks to a network directly; it consumes the
//! ledger, the encryption/decryption service, and the key custody signer
//! through these traits. All calls are synchronous from the caller's point
//! of view: a write returns only once confirmation has been observed, and a
//! signing call may block arbitrarily long awaiting user approval
//! (cancellation belongs to the surrounding caller, not to this crate).
//!
//! [`crate::software_stack`] provides deterministic in-process
//! implementations of every seam.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::ciphertext::{CiphertextHandle, EncryptedInput};
use crate::decryption_grant::{DecryptionGrant, DecryptionKeypair, HandleRequest, SigningDomain};
use crate::error::GameError;

// ---------------------------------------------------------------------------
// GameLedger — the on-chain storage/computation engine
// ---------------------------------------------------------------------------

/// Read/write surface of the game ledger contract.
///
/// The four reads are independent of each other but must all be re-issued
/// after a write before local state derived from them is trusted. Writes
/// are two-phase (submit, then await confirmation); implementations return
/// `Ok` only once the action is confirmed.
pub trait GameLedger {
    /// Whether the player currently has an unresolved round.
    fn has_active_game(&self, player: &Address) -> Result<bool, GameError>;

    /// Whether the player's latest round has a stored outcome.
    fn has_result(&self, player: &Address) -> Result<bool, GameError>;

    /// Handle of the player's encrypted secret; all-zero when absent.
    fn encrypted_secret(&self, player: &Address) -> Result<CiphertextHandle, GameError>;

    /// Handle of the player's encrypted outcome; all-zero when absent.
    fn encrypted_result(&self, player: &Address) -> Result<CiphertextHandle, GameError>;

    /// Start a round: the ledger assigns a fresh encrypted secret in
    /// [1, 20] to the caller.
    fn start_game(&mut self, player: &Address) -> Result<(), GameError>;

    /// Submit an encrypted guess. The ledger verifies the proof binding,
    /// evaluates the encrypted comparison and stores the boolean outcome.
    fn submit_encrypted_guess(
        &mut self,
        player: &Address,
        input: &EncryptedInput,
    ) -> Result<(), GameError>;
}

// ---------------------------------------------------------------------------
// EncryptionProvider — encryption/decryption service network
// ---------------------------------------------------------------------------

/// The relayer/encryption service: registers fresh ciphertexts and fulfills
/// decryption grants.
pub trait EncryptionProvider {
    /// Encrypt an 8-bit value bound to `(contract, submitter)`; the returned
    /// proof is rejected by any verifier if either identity differs later.
    fn encrypt_u8(
        &mut self,
        contract: &Address,
        submitter: &Address,
        value: u8,
    ) -> Result<EncryptedInput, GameError>;

    /// Generate a fresh ephemeral keypair for one decryption handshake.
    fn generate_keypair(&mut self) -> Result<DecryptionKeypair, GameError>;

    /// Fulfill a decryption grant: return a plaintext for each requested
    /// handle the grant covers. Entries may be missing; the caller decides
    /// whether a partial response is acceptable (the handshake engine does
    /// not).
    fn user_decrypt(
        &self,
        grant: &DecryptionGrant,
        keypair: &DecryptionKeypair,
        requests: &[HandleRequest],
        requester: &Address,
    ) -> Result<BTreeMap<CiphertextHandle, u64>, GameError>;
}

// ---------------------------------------------------------------------------
// StructuredMessageSigner — key custody
// ---------------------------------------------------------------------------

/// Key custody collaborator: signs a typed, domain-scoped message on behalf
/// of an account. May suspend indefinitely awaiting user approval.
pub trait StructuredMessageSigner {
    /// Sign the canonical digest of a structured message. Returns the
    /// signature in presentation form (`0x`-prefixed hex); callers strip
    /// the prefix before wire use.
    fn sign_structured(
        &self,
        domain: &SigningDomain,
        type_descriptor: &serde_json::Value,
        digest: &[u8; 32],
        signer: &Address,
    ) -> Result<String, GameError>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock seam. Validity windows derive their start from this on every
/// handshake; the value is never cached across calls.
pub trait Clock {
    /// Current unix time in seconds.
    fn unix_now(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
