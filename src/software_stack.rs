//! Software-mode collaborators.
//!
//! Deterministic in-process stand-ins for the three external services,
//! usable as a local simulator and by the test suites. In software mode
//! "encryption" is a vault lookup and a signature is a keyed digest; the
//! access rules (identity binding, grant scope, validity window, per-handle
//! ACLs) are enforced exactly as the real services would.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::ciphertext::{binding_digest, CiphertextHandle, EncryptedInput, InputProof};
use crate::collaborators::{Clock, EncryptionProvider, GameLedger, StructuredMessageSigner};
use crate::decryption_grant::{
    DecryptionGrant, DecryptionKeypair, HandleRequest, SigningDomain, USER_DECRYPT_DOMAIN,
};
use crate::error::GameError;

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// SoftwareVault — encryption/decryption service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct VaultEntry {
    value: u64,
    contract: Address,
    allowed: BTreeSet<Address>,
}

#[derive(Debug, Default)]
struct VaultState {
    seed: u64,
    counter: u64,
    entries: BTreeMap<CiphertextHandle, VaultEntry>,
    trusted_signer_keys: Vec<[u8; 32]>,
    withheld: BTreeSet<CiphertextHandle>,
    now: i64,
    offline: bool,
}

/// In-process ciphertext store standing in for the encryption/decryption
/// service network.
///
/// Cheaply cloneable; clones share the same store so the ledger stand-in
/// and the protocol client observe one ciphertext space.
#[derive(Debug, Clone, Default)]
pub struct SoftwareVault {
    inner: Rc<RefCell<VaultState>>,
}

impl SoftwareVault {
    /// New vault with a seed for deterministic handle derivation.
    pub fn new(seed: u64) -> Self {
        let state = VaultState {
            seed,
            ..VaultState::default()
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// Trust a custody signer's verifying key for grant verification.
    pub fn trust_signer(&self, verifying_key: [u8; 32]) {
        self.inner.borrow_mut().trusted_signer_keys.push(verifying_key);
    }

    /// Current service-side time used for grant window checks.
    pub fn set_now(&self, unix_now: i64) {
        self.inner.borrow_mut().now = unix_now;
    }

    /// Simulate unreachability: every call fails until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.inner.borrow_mut().offline = offline;
    }

    /// Withhold one handle from decryption responses without erroring,
    /// producing the missing-entry shape a flaky service can return.
    pub fn withhold(&self, handle: CiphertextHandle) {
        self.inner.borrow_mut().withheld.insert(handle);
    }

    /// Store a service-side ciphertext (ledger-minted secret or outcome)
    /// readable by the given identities.
    pub fn store_internal(
        &self,
        contract: Address,
        value: u64,
        allowed: &[Address],
    ) -> CiphertextHandle {
        let mut state = self.inner.borrow_mut();
        let handle = state.next_handle(b"internal", &contract);
        state.entries.insert(
            handle,
            VaultEntry {
                value,
                contract,
                allowed: allowed.iter().copied().collect(),
            },
        );
        handle
    }

    /// Ledger-side privileged read of a stored value (the encrypted
    /// comparison evaluates over it).
    pub fn value_of(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.inner.borrow().entries.get(handle).map(|e| e.value)
    }
}

impl VaultState {
    fn next_handle(&mut self, tag: &[u8], contract: &Address) -> CiphertextHandle {
        self.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update(self.seed.to_be_bytes());
        hasher.update(self.counter.to_be_bytes());
        hasher.update(contract.as_bytes());
        let handle = CiphertextHandle(hasher.finalize().into());
        debug_assert!(!handle.is_zero());
        handle
    }

    fn grant_signature_trusted(&self, grant: &DecryptionGrant) -> bool {
        let digest = grant.request().digest();
        self.trusted_signer_keys
            .iter()
            .any(|key| software_signature(key, &USER_DECRYPT_DOMAIN, &digest) == grant.signature)
    }
}

impl EncryptionProvider for SoftwareVault {
    fn encrypt_u8(
        &mut self,
        contract: &Address,
        submitter: &Address,
        value: u8,
    ) -> Result<EncryptedInput, GameError> {
        let mut state = self.inner.borrow_mut();
        if state.offline {
            return Err(GameError::EncryptionServiceUnavailable(
                "software vault offline".to_string(),
            ));
        }
        let handle = state.next_handle(b"input", contract);
        state.entries.insert(
            handle,
            VaultEntry {
                value: value as u64,
                contract: *contract,
                allowed: BTreeSet::from([*submitter]),
            },
        );
        let proof = InputProof(binding_digest(&handle, contract, submitter).to_vec());
        Ok(EncryptedInput { handle, proof })
    }

    fn generate_keypair(&mut self) -> Result<DecryptionKeypair, GameError> {
        let mut state = self.inner.borrow_mut();
        if state.offline {
            return Err(GameError::ServiceUnavailable(
                "software vault offline".to_string(),
            ));
        }
        state.counter += 1;
        let n = state.counter;
        let public_key: [u8; 32] = Sha256::digest([b"pub".as_slice(), &n.to_be_bytes()].concat()).into();
        let private_key: [u8; 32] =
            Sha256::digest([b"priv".as_slice(), &n.to_be_bytes()].concat()).into();
        Ok(DecryptionKeypair::from_parts(public_key, private_key))
    }

    fn user_decrypt(
        &self,
        grant: &DecryptionGrant,
        keypair: &DecryptionKeypair,
        requests: &[HandleRequest],
        requester: &Address,
    ) -> Result<BTreeMap<CiphertextHandle, u64>, GameError> {
        let state = self.inner.borrow();
        if state.offline {
            return Err(GameError::ServiceUnavailable(
                "software vault offline".to_string(),
            ));
        }
        if grant.public_key != *keypair.public_key() {
            return Err(GameError::ServiceUnavailable(
                "grant public key does not match the presented keypair".to_string(),
            ));
        }
        if !grant.is_valid_at(state.now) {
            return Err(GameError::ServiceUnavailable(
                "grant validity window rejected".to_string(),
            ));
        }
        if !state.grant_signature_trusted(grant) {
            return Err(GameError::ServiceUnavailable(
                "grant signature rejected".to_string(),
            ));
        }

        let mut plaintexts = BTreeMap::new();
        for request in requests {
            if state.withheld.contains(&request.handle) {
                continue;
            }
            let Some(entry) = state.entries.get(&request.handle) else {
                continue;
            };
            // Scope binding: the handle's owning contract must match the
            // request and sit inside the signed grant scope.
            if entry.contract != request.contract || !grant.covers_contract(&entry.contract) {
                continue;
            }
            if !entry.allowed.contains(requester) {
                continue;
            }
            plaintexts.insert(request.handle, entry.value);
        }
        Ok(plaintexts)
    }
}

// ---------------------------------------------------------------------------
// SoftwareLedger — the game contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct PlayerRound {
    active: bool,
    has_result: bool,
    secret_handle: CiphertextHandle,
    result_handle: CiphertextHandle,
    secret_value: u64,
}

/// In-process game ledger with the contract's semantics: `start_game`
/// assigns a secret in [1, 20], `submit_encrypted_guess` verifies the input
/// binding and stores `secret + guess == 21` as the encrypted outcome.
#[derive(Debug)]
pub struct SoftwareLedger {
    vault: SoftwareVault,
    contract: Address,
    seed: u64,
    round_counter: u64,
    rounds: BTreeMap<Address, PlayerRound>,
    next_secret_override: Cell<Option<u64>>,
    unreachable: bool,
}

impl SoftwareLedger {
    /// New ledger sharing the given vault.
    pub fn new(vault: SoftwareVault, contract: Address, seed: u64) -> Self {
        Self {
            vault,
            contract,
            seed,
            round_counter: 0,
            rounds: BTreeMap::new(),
            next_secret_override: Cell::new(None),
            unreachable: false,
        }
    }

    /// Contract identity this ledger serves.
    pub fn contract(&self) -> &Address {
        &self.contract
    }

    /// Force the next `start_game` to assign a specific secret.
    pub fn set_next_secret(&self, secret: u64) {
        self.next_secret_override.set(Some(secret));
    }

    /// Simulate an unreachable ledger: reads fail until cleared.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    fn check_reachable(&self) -> Result<(), GameError> {
        if self.unreachable {
            return Err(GameError::LedgerUnreachable(
                "software ledger unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn draw_secret(&mut self, player: &Address) -> u64 {
        if let Some(secret) = self.next_secret_override.take() {
            return secret;
        }
        self.round_counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"secret");
        hasher.update(self.seed.to_be_bytes());
        hasher.update(self.round_counter.to_be_bytes());
        hasher.update(player.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        (u64::from_be_bytes(digest[..8].try_into().unwrap()) % 20) + 1
    }
}

impl GameLedger for SoftwareLedger {
    fn has_active_game(&self, player: &Address) -> Result<bool, GameError> {
        self.check_reachable()?;
        Ok(self.rounds.get(player).map(|r| r.active).unwrap_or(false))
    }

    fn has_result(&self, player: &Address) -> Result<bool, GameError> {
        self.check_reachable()?;
        Ok(self
            .rounds
            .get(player)
            .map(|r| r.has_result)
            .unwrap_or(false))
    }

    fn encrypted_secret(&self, player: &Address) -> Result<CiphertextHandle, GameError> {
        self.check_reachable()?;
        Ok(self
            .rounds
            .get(player)
            .map(|r| r.secret_handle)
            .unwrap_or(CiphertextHandle::ZERO))
    }

    fn encrypted_result(&self, player: &Address) -> Result<CiphertextHandle, GameError> {
        self.check_reachable()?;
        Ok(self
            .rounds
            .get(player)
            .map(|r| r.result_handle)
            .unwrap_or(CiphertextHandle::ZERO))
    }

    fn start_game(&mut self, player: &Address) -> Result<(), GameError> {
        self.check_reachable()?;
        let secret = self.draw_secret(player);
        let secret_handle = self
            .vault
            .store_internal(self.contract, secret, &[*player]);
        self.rounds.insert(
            *player,
            PlayerRound {
                active: true,
                has_result: false,
                secret_handle,
                result_handle: CiphertextHandle::ZERO,
                secret_value: secret,
            },
        );
        Ok(())
    }

    fn submit_encrypted_guess(
        &mut self,
        player: &Address,
        input: &EncryptedInput,
    ) -> Result<(), GameError> {
        self.check_reachable()?;
        let contract = self.contract;
        let round = self.rounds.get_mut(player).ok_or_else(|| {
            GameError::LedgerWriteFailed("no active game for this player".to_string())
        })?;
        if !round.active {
            return Err(GameError::LedgerWriteFailed(
                "no active game for this player".to_string(),
            ));
        }

        // The validity proof must bind the ciphertext to this contract and
        // this submitter; anything else is a replay and reverts.
        let expected = binding_digest(&input.handle, &contract, player);
        if input.proof.as_bytes() != expected {
            return Err(GameError::LedgerWriteFailed(
                "input proof rejected: ciphertext not bound to this contract and submitter"
                    .to_string(),
            ));
        }

        let guess = self.vault.value_of(&input.handle).ok_or_else(|| {
            GameError::LedgerWriteFailed("unknown ciphertext handle".to_string())
        })?;
        let won = round.secret_value + guess == 21;
        let result_handle = self
            .vault
            .store_internal(contract, u64::from(won), &[*player]);

        round.active = false;
        round.has_result = true;
        round.result_handle = result_handle;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SoftwareSigner — key custody
// ---------------------------------------------------------------------------

/// Keyed digest signature in software mode: hex of
/// H(key || domain || digest), presented with a `0x` prefix.
fn software_signature(key: &[u8; 32], domain: &SigningDomain, digest: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(domain.to_string().as_bytes());
    hasher.update(digest);
    encode_hex(&hasher.finalize())
}

/// Software-mode key custody: signs immediately with a fixed key.
#[derive(Debug, Clone)]
pub struct SoftwareSigner {
    key: [u8; 32],
}

impl SoftwareSigner {
    /// New signer with the given secret key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Verifying key the vault registers to accept this signer's grants.
    /// Symmetric in software mode.
    pub fn verifying_key(&self) -> [u8; 32] {
        self.key
    }
}

impl StructuredMessageSigner for SoftwareSigner {
    fn sign_structured(
        &self,
        domain: &SigningDomain,
        _type_descriptor: &serde_json::Value,
        digest: &[u8; 32],
        _signer: &Address,
    ) -> Result<String, GameError> {
        Ok(format!("0x{}", software_signature(&self.key, domain, digest)))
    }
}

/// Custody stand-in that always declines, for `SignerUnavailable` paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefusingSigner;

impl StructuredMessageSigner for RefusingSigner {
    fn sign_structured(
        &self,
        _domain: &SigningDomain,
        _type_descriptor: &serde_json::Value,
        _digest: &[u8; 32],
        _signer: &Address,
    ) -> Result<String, GameError> {
        Err(GameError::SignerUnavailable(
            "user declined the signature request".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Settable clock for tests and simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    /// Clock frozen at the given unix time.
    pub fn at(unix_now: i64) -> Self {
        Self {
            now: Cell::new(unix_now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, seconds: i64) {
        self.now.set(self.now.get() + seconds);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, unix_now: i64) {
        self.now.set(unix_now);
    }
}

impl Clock for ManualClock {
    fn unix_now(&self) -> i64 {
        self.now.get()
    }
}
