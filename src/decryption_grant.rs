//! Authenticated decryption handshake.
//!
//! A holder of a ledger account proves authorization to decrypt specific
//! ciphertext handles and recovers the plaintext locally:
//! 1. Generate a fresh ephemeral keypair (never reused, never persisted).
//! 2. Build a typed, domain-scoped [`UserDecryptRequest`] over the ephemeral
//!    public key, the distinct contract scope, and a bounded validity window.
//! 3. Obtain a signature over its canonical digest from key custody.
//! 4. Exchange `{grant, keypair, handles}` with the decryption service and
//!    demand a plaintext for every requested handle.
//!
//! The two suspension points (signature, then service) are sequential by
//! construction — the service call needs the signature — and are modeled as
//! an explicit [`HandshakePhase`] so callers can observe where a handshake
//! stopped. Partial success is disallowed: one missing plaintext fails the
//! whole call.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::ciphertext::CiphertextHandle;
use crate::collaborators::{Clock, EncryptionProvider, StructuredMessageSigner};
use crate::error::GameError;

/// Fixed grant lifetime: 10 days from issuance.
pub const GRANT_VALIDITY_DAYS: u64 = 10;

const SECONDS_PER_DAY: i64 = 86_400;

// ---------------------------------------------------------------------------
// SigningDomain
// ---------------------------------------------------------------------------

/// Versioned signing domain for structured authorization messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDomain {
    /// Domain name.
    pub name: &'static str,
    /// Schema version.
    pub version: &'static str,
}

/// The fixed domain under which user-decrypt requests are signed.
pub const USER_DECRYPT_DOMAIN: SigningDomain = SigningDomain {
    name: "UserDecryptRequestVerification",
    version: "1",
};

impl fmt::Display for SigningDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.v{}", self.name, self.version)
    }
}

// ---------------------------------------------------------------------------
// DecryptionKeypair
// ---------------------------------------------------------------------------

/// Ephemeral keypair for one decryption handshake.
///
/// Constructed inside the handshake, handed to the decryption service call,
/// and dropped when the handshake returns. Not cloneable and not
/// serializable; the private key never appears in debug output.
pub struct DecryptionKeypair {
    public_key: [u8; 32],
    private_key: [u8; 32],
}

impl DecryptionKeypair {
    /// Assemble a keypair. Providers call this from `generate_keypair`.
    pub fn from_parts(public_key: [u8; 32], private_key: [u8; 32]) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// The ephemeral public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// The ephemeral private key. Used by the provider to reconstruct
    /// plaintexts locally; never transmitted by the engine itself.
    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }
}

impl fmt::Debug for DecryptionKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKeypair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HandleRequest
// ---------------------------------------------------------------------------

/// One handle to decrypt, together with the contract that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleRequest {
    /// The ciphertext handle to decrypt.
    pub handle: CiphertextHandle,
    /// Contract the handle belongs to; becomes part of the grant scope.
    pub contract: Address,
}

// ---------------------------------------------------------------------------
// UserDecryptRequest — the structured authorization message
// ---------------------------------------------------------------------------

/// Typed authorization message signed by the key holder.
///
/// Encoding is deterministic: two requests with equal field values produce
/// identical canonical bytes and therefore identical digests. Contract
/// identities are deduplicated and sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDecryptRequest {
    /// Ephemeral public key the plaintexts will be returned under.
    pub public_key: [u8; 32],
    /// Distinct contract identities in scope, sorted.
    pub contracts: Vec<Address>,
    /// Window start, unix seconds. Re-derived from the clock on every
    /// handshake, never cached.
    pub window_start: i64,
    /// Window duration in days.
    pub window_duration_days: u64,
}

impl UserDecryptRequest {
    /// Build the message for a handle set, deduplicating contract scope.
    pub fn new(public_key: [u8; 32], requests: &[HandleRequest], window_start: i64) -> Self {
        let contracts: BTreeSet<Address> = requests.iter().map(|r| r.contract).collect();
        Self {
            public_key,
            contracts: contracts.into_iter().collect(),
            window_start,
            window_duration_days: GRANT_VALIDITY_DAYS,
        }
    }

    /// Canonical bytes for signing: length-prefixed domain, then each field
    /// in declaration order, big-endian.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let domain = USER_DECRYPT_DOMAIN.to_string();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(domain.len() as u32).to_be_bytes());
        buf.extend_from_slice(domain.as_bytes());
        buf.extend_from_slice(&self.public_key);
        buf.extend_from_slice(&(self.contracts.len() as u32).to_be_bytes());
        for contract in &self.contracts {
            buf.extend_from_slice(contract.as_bytes());
        }
        buf.extend_from_slice(&self.window_start.to_be_bytes());
        buf.extend_from_slice(&self.window_duration_days.to_be_bytes());
        buf
    }

    /// SHA-256 digest of the canonical bytes.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_bytes()).into()
    }

    /// JSON descriptor of the message schema, handed to key custody so the
    /// holder sees what they are signing.
    pub fn type_descriptor() -> serde_json::Value {
        json!({
            USER_DECRYPT_DOMAIN.name: [
                { "name": "publicKey", "type": "bytes" },
                { "name": "contractAddresses", "type": "address[]" },
                { "name": "startTimestamp", "type": "uint256" },
                { "name": "durationDays", "type": "uint256" },
            ]
        })
    }
}

// ---------------------------------------------------------------------------
// DecryptionGrant
// ---------------------------------------------------------------------------

/// Time- and scope-bounded authorization to decrypt.
///
/// Valid only for the contract scope and window it was signed over; the
/// decryption service is the sole arbiter of validity and rejects expired
/// or out-of-scope grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionGrant {
    /// Ephemeral public key the grant is bound to.
    pub public_key: [u8; 32],
    /// Custody signature over the request digest, hex without presentation
    /// prefix.
    pub signature: String,
    /// Contract identities in scope, sorted and distinct.
    pub contracts: Vec<Address>,
    /// Window start, unix seconds.
    pub window_start: i64,
    /// Window duration in days.
    pub window_duration_days: u64,
}

impl DecryptionGrant {
    /// Whether the grant window covers the given time.
    pub fn is_valid_at(&self, unix_now: i64) -> bool {
        let duration = self.window_duration_days as i64 * SECONDS_PER_DAY;
        unix_now >= self.window_start && unix_now <= self.window_start.saturating_add(duration)
    }

    /// Whether a contract is inside the grant scope.
    pub fn covers_contract(&self, contract: &Address) -> bool {
        self.contracts.contains(contract)
    }

    /// The request this grant was signed over.
    pub fn request(&self) -> UserDecryptRequest {
        UserDecryptRequest {
            public_key: self.public_key,
            contracts: self.contracts.clone(),
            window_start: self.window_start,
            window_duration_days: self.window_duration_days,
        }
    }
}

/// Strip the `0x` presentation prefix from a custody signature.
pub fn strip_signature_prefix(signature: &str) -> &str {
    signature
        .strip_prefix("0x")
        .or_else(|| signature.strip_prefix("0X"))
        .unwrap_or(signature)
}

// ---------------------------------------------------------------------------
// HandshakePhase
// ---------------------------------------------------------------------------

/// Where a handshake currently stands (or where it stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakePhase {
    /// No handshake has run yet.
    Idle,
    /// Waiting on key custody to sign the authorization message.
    AwaitingSignature,
    /// Waiting on the decryption service to fulfill the grant.
    AwaitingService,
    /// Last handshake completed with plaintexts for every handle.
    Done,
    /// Last handshake failed; see the returned error.
    Failed,
}

impl Default for HandshakePhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingSignature => "awaiting-signature",
            Self::AwaitingService => "awaiting-service",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// DecryptionEngine
// ---------------------------------------------------------------------------

/// Drives authenticated decryption handshakes.
///
/// Holds no key material between calls; the ephemeral keypair lives and
/// dies inside [`DecryptionEngine::decrypt`].
#[derive(Debug, Clone, Default)]
pub struct DecryptionEngine {
    phase: HandshakePhase,
}

impl DecryptionEngine {
    /// New engine with no handshake history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase the most recent handshake reached.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Run one handshake for a set of handles and return every plaintext.
    ///
    /// Fails with `DecryptionFailed(handle)` if the service response lacks
    /// any requested handle; no partial map is ever returned.
    pub fn decrypt<P, S, C>(
        &mut self,
        provider: &mut P,
        signer: &S,
        clock: &C,
        requests: &[HandleRequest],
        requester: &Address,
    ) -> Result<BTreeMap<CiphertextHandle, u64>, GameError>
    where
        P: EncryptionProvider,
        S: StructuredMessageSigner,
        C: Clock,
    {
        if requests.is_empty() {
            return Err(GameError::PreconditionViolation(
                "decryption requested for an empty handle set".to_string(),
            ));
        }
        for request in requests {
            if request.handle.is_zero() {
                return Err(GameError::PreconditionViolation(
                    "all-zero handle denotes an absent ciphertext and cannot be decrypted"
                        .to_string(),
                ));
            }
            if request.contract.is_zero() {
                return Err(GameError::InvalidInput(
                    "zero contract identity in decryption request".to_string(),
                ));
            }
        }
        if requester.is_zero() {
            return Err(GameError::InvalidInput(
                "zero requester identity".to_string(),
            ));
        }

        self.phase = HandshakePhase::AwaitingSignature;
        let outcome = self.run_handshake(provider, signer, clock, requests, requester);
        self.phase = match outcome {
            Ok(_) => HandshakePhase::Done,
            Err(_) => HandshakePhase::Failed,
        };
        outcome
    }

    /// Convenience wrapper for the single-handle case.
    pub fn decrypt_one<P, S, C>(
        &mut self,
        provider: &mut P,
        signer: &S,
        clock: &C,
        handle: CiphertextHandle,
        contract: Address,
        requester: &Address,
    ) -> Result<u64, GameError>
    where
        P: EncryptionProvider,
        S: StructuredMessageSigner,
        C: Clock,
    {
        let request = HandleRequest { handle, contract };
        let mut plaintexts = self.decrypt(provider, signer, clock, &[request], requester)?;
        plaintexts
            .remove(&handle)
            .ok_or(GameError::DecryptionFailed(handle))
    }

    fn run_handshake<P, S, C>(
        &mut self,
        provider: &mut P,
        signer: &S,
        clock: &C,
        requests: &[HandleRequest],
        requester: &Address,
    ) -> Result<BTreeMap<CiphertextHandle, u64>, GameError>
    where
        P: EncryptionProvider,
        S: StructuredMessageSigner,
        C: Clock,
    {
        // Fresh keypair and window start on every call.
        let keypair = provider.generate_keypair()?;
        let window_start = clock.unix_now();
        let message = UserDecryptRequest::new(*keypair.public_key(), requests, window_start);

        // First suspension point: key custody. May block on user approval.
        let signature = signer.sign_structured(
            &USER_DECRYPT_DOMAIN,
            &UserDecryptRequest::type_descriptor(),
            &message.digest(),
            requester,
        )?;

        let grant = DecryptionGrant {
            public_key: message.public_key,
            signature: strip_signature_prefix(&signature).to_string(),
            contracts: message.contracts,
            window_start: message.window_start,
            window_duration_days: message.window_duration_days,
        };

        // Second suspension point: the decryption service.
        self.phase = HandshakePhase::AwaitingService;
        let plaintexts = provider.user_decrypt(&grant, &keypair, requests, requester)?;

        // Every requested handle must be present; one gap fails the call.
        for request in requests {
            if !plaintexts.contains_key(&request.handle) {
                return Err(GameError::DecryptionFailed(request.handle));
            }
        }
        Ok(plaintexts)
    }
}
