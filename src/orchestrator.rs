//! Top-level session coordinator.
//!
//! One orchestrator per player identity. It sequences encrypted-input
//! construction, the decryption handshake, and ledger writes; serializes
//! operations for its player (an in-flight guard rejects overlap); and
//! re-issues all four ledger reads after every confirmed write so reported
//! status always reflects the ledger's view, never local guesswork.
//!
//! Every attempted operation, success or failure, lands in a seq-numbered
//! audit trail.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::collaborators::{Clock, EncryptionProvider, GameLedger, StructuredMessageSigner};
use crate::decryption_grant::{DecryptionEngine, HandshakePhase};
use crate::encrypted_input::EncryptedInputBuilder;
use crate::error::GameError;
use crate::session::{suggested_guess, SessionSnapshot, SessionStage};

// ---------------------------------------------------------------------------
// SessionAction / SessionEvent — audit trail
// ---------------------------------------------------------------------------

/// Operations the orchestrator records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAction {
    /// `start`: begin a round.
    Start,
    /// `request_secret`: decrypt the assigned secret.
    RequestSecret,
    /// `submit_guess`: encrypt and submit a guess.
    SubmitGuess,
    /// `request_result`: decrypt the round outcome.
    RequestResult,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::RequestSecret => "request-secret",
            Self::SubmitGuess => "submit-guess",
            Self::RequestResult => "request-result",
        };
        f.write_str(name)
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Unix seconds at record time.
    pub timestamp: i64,
    /// Operation attempted.
    pub action: SessionAction,
    /// `"ok"` or the error kind.
    pub outcome: String,
    /// Error detail when the operation failed.
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

/// Coordinates one player's confidential game session.
#[derive(Debug)]
pub struct SessionOrchestrator<L, P, S, C> {
    ledger: L,
    provider: P,
    signer: S,
    clock: C,
    contract: Address,
    player: Address,
    engine: DecryptionEngine,
    snapshot: SessionSnapshot,
    cached_secret: Option<u64>,
    cached_result: Option<bool>,
    in_flight: bool,
    events: Vec<SessionEvent>,
    next_seq: u64,
}

impl<L, P, S, C> SessionOrchestrator<L, P, S, C>
where
    L: GameLedger,
    P: EncryptionProvider,
    S: StructuredMessageSigner,
    C: Clock,
{
    /// New orchestrator for a `(contract, player)` pair.
    pub fn new(
        ledger: L,
        provider: P,
        signer: S,
        clock: C,
        contract: Address,
        player: Address,
    ) -> Result<Self, GameError> {
        if contract.is_zero() {
            return Err(GameError::InvalidInput(
                "zero contract identity".to_string(),
            ));
        }
        if player.is_zero() {
            return Err(GameError::InvalidInput("zero player identity".to_string()));
        }
        Ok(Self {
            ledger,
            provider,
            signer,
            clock,
            contract,
            player,
            engine: DecryptionEngine::new(),
            snapshot: SessionSnapshot::default(),
            cached_secret: None,
            cached_result: None,
            in_flight: false,
            events: Vec::new(),
            next_seq: 0,
        })
    }

    // -- status queries (idempotent) ----------------------------------------

    /// Re-issue all four ledger reads and rebuild the snapshot.
    ///
    /// Cached plaintexts that no longer belong to the ledger's view of the
    /// round are dropped.
    pub fn refresh(&mut self) -> Result<SessionSnapshot, GameError> {
        let has_active = self.ledger.has_active_game(&self.player)?;
        let has_result = self.ledger.has_result(&self.player)?;
        let secret = self.ledger.encrypted_secret(&self.player)?;
        let result = self.ledger.encrypted_result(&self.player)?;
        self.snapshot = SessionSnapshot::from_reads(has_active, has_result, secret, result);

        if self.snapshot.stage != SessionStage::Active {
            self.cached_secret = None;
        }
        if self.snapshot.stage != SessionStage::Resolved {
            self.cached_result = None;
        }
        Ok(self.snapshot)
    }

    /// Current stage, re-read from the ledger.
    pub fn stage(&mut self) -> Result<SessionStage, GameError> {
        Ok(self.refresh()?.stage)
    }

    /// Snapshot from the most recent refresh.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
    }

    /// Locally decrypted secret, if the active round has one cached.
    pub fn cached_secret(&self) -> Option<u64> {
        self.cached_secret
    }

    /// Locally decrypted outcome, if the resolved round has one cached.
    pub fn cached_result(&self) -> Option<bool> {
        self.cached_result
    }

    /// Default guess the UI offers: the complement of the cached secret to
    /// 21. Informational only; any value in [0, 21] may be submitted.
    pub fn suggested_guess(&self) -> Option<u8> {
        self.cached_secret.map(suggested_guess)
    }

    /// Phase the most recent decryption handshake reached.
    pub fn handshake_phase(&self) -> HandshakePhase {
        self.engine.phase()
    }

    /// The audit trail.
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// Player identity this orchestrator serves.
    pub fn player(&self) -> &Address {
        &self.player
    }

    /// Contract identity this orchestrator serves.
    pub fn contract(&self) -> &Address {
        &self.contract
    }

    // -- operations (serialized per player) ----------------------------------

    /// Start a round. Legal from Idle or Resolved; restarting from Resolved
    /// clears the previous round's cached values.
    pub fn start(&mut self) -> Result<(), GameError> {
        self.acquire(SessionAction::Start)?;
        let outcome = self.start_inner();
        self.finish(SessionAction::Start, outcome)
    }

    /// Decrypt the assigned secret through the grant handshake and cache it.
    /// Idempotent with respect to ledger state: repeated calls on the same
    /// handle yield the same plaintext.
    pub fn request_secret(&mut self) -> Result<u64, GameError> {
        self.acquire(SessionAction::RequestSecret)?;
        let outcome = self.request_secret_inner();
        self.finish(SessionAction::RequestSecret, outcome)
    }

    /// Encrypt a guess bound to `(contract, player)` and submit it. The
    /// ledger evaluates the encrypted comparison and resolves the round.
    pub fn submit_guess(&mut self, guess: u8) -> Result<(), GameError> {
        self.acquire(SessionAction::SubmitGuess)?;
        let outcome = self.submit_guess_inner(guess);
        self.finish(SessionAction::SubmitGuess, outcome)
    }

    /// Decrypt the round outcome: plaintext 1 means the guess complemented
    /// the secret to 21, anything else means it did not.
    pub fn request_result(&mut self) -> Result<bool, GameError> {
        self.acquire(SessionAction::RequestResult)?;
        let outcome = self.request_result_inner();
        self.finish(SessionAction::RequestResult, outcome)
    }

    // -- internals ------------------------------------------------------------

    fn start_inner(&mut self) -> Result<(), GameError> {
        self.refresh()?;
        self.snapshot.check_start()?;
        self.ledger.start_game(&self.player)?;
        self.cached_secret = None;
        self.cached_result = None;
        self.refresh()?;
        Ok(())
    }

    fn request_secret_inner(&mut self) -> Result<u64, GameError> {
        self.refresh()?;
        self.snapshot.check_request_secret()?;
        let plaintext = self.engine.decrypt_one(
            &mut self.provider,
            &self.signer,
            &self.clock,
            self.snapshot.secret_handle,
            self.contract,
            &self.player,
        )?;
        self.cached_secret = Some(plaintext);
        Ok(plaintext)
    }

    fn submit_guess_inner(&mut self, guess: u8) -> Result<(), GameError> {
        self.refresh()?;
        self.snapshot.check_submit_guess(guess)?;
        let builder = EncryptedInputBuilder::new(self.contract, self.player)?;
        let input = builder.build(&mut self.provider, guess)?;
        self.ledger.submit_encrypted_guess(&self.player, &input)?;
        self.refresh()?;
        Ok(())
    }

    fn request_result_inner(&mut self) -> Result<bool, GameError> {
        self.refresh()?;
        self.snapshot.check_request_result()?;
        let plaintext = self.engine.decrypt_one(
            &mut self.provider,
            &self.signer,
            &self.clock,
            self.snapshot.result_handle,
            self.contract,
            &self.player,
        )?;
        let won = plaintext == 1;
        self.cached_result = Some(won);
        Ok(won)
    }

    fn acquire(&mut self, action: SessionAction) -> Result<(), GameError> {
        if self.in_flight {
            let err = GameError::PreconditionViolation(format!(
                "another operation is in flight; {action} rejected"
            ));
            self.record(action, Some(&err));
            return Err(err);
        }
        self.in_flight = true;
        Ok(())
    }

    fn finish<T>(
        &mut self,
        action: SessionAction,
        outcome: Result<T, GameError>,
    ) -> Result<T, GameError> {
        self.in_flight = false;
        self.record(action, outcome.as_ref().err());
        outcome
    }

    fn record(&mut self, action: SessionAction, error: Option<&GameError>) {
        let event = SessionEvent {
            seq: self.next_seq,
            timestamp: self.clock.unix_now(),
            action,
            outcome: error.map(|e| e.kind().to_string()).unwrap_or_else(|| "ok".to_string()),
            detail: error.map(|e| e.to_string()),
        };
        self.next_seq += 1;
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software_stack::{
        ManualClock, RefusingSigner, SoftwareLedger, SoftwareSigner, SoftwareVault,
    };

    const NOW: i64 = 1_700_000_000;

    fn contract() -> Address {
        Address([0xC0; 20])
    }

    fn player() -> Address {
        Address([0xA1; 20])
    }

    fn orchestrator(
    ) -> SessionOrchestrator<SoftwareLedger, SoftwareVault, SoftwareSigner, ManualClock> {
        let vault = SoftwareVault::new(42);
        vault.set_now(NOW);
        let signer = SoftwareSigner::new([0x11; 32]);
        vault.trust_signer(signer.verifying_key());
        let ledger = SoftwareLedger::new(vault.clone(), contract(), 7);
        SessionOrchestrator::new(
            ledger,
            vault,
            signer,
            ManualClock::at(NOW),
            contract(),
            player(),
        )
        .unwrap()
    }

    #[test]
    fn zero_identities_are_rejected_at_construction() {
        let vault = SoftwareVault::new(1);
        let ledger = SoftwareLedger::new(vault.clone(), contract(), 1);
        let err = SessionOrchestrator::new(
            ledger,
            vault,
            SoftwareSigner::new([0; 32]),
            ManualClock::at(0),
            Address::ZERO,
            player(),
        )
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
    }

    #[test]
    fn full_round_with_the_suggested_guess_wins() {
        let mut orch = orchestrator();
        assert_eq!(orch.stage().unwrap(), SessionStage::Idle);

        orch.start().unwrap();
        assert_eq!(orch.snapshot().stage, SessionStage::Active);
        assert!(orch.snapshot().invariants_hold());

        let secret = orch.request_secret().unwrap();
        assert!((1..=20).contains(&secret));
        let guess = orch.suggested_guess().unwrap();
        assert_eq!(guess as u64 + secret, 21);

        orch.submit_guess(guess).unwrap();
        assert_eq!(orch.snapshot().stage, SessionStage::Resolved);
        assert!(orch.snapshot().invariants_hold());

        assert!(orch.request_result().unwrap());
        assert_eq!(orch.cached_result(), Some(true));
    }

    #[test]
    fn start_while_active_fails_without_touching_the_ledger() {
        let mut orch = orchestrator();
        orch.start().unwrap();
        let secret_handle = orch.snapshot().secret_handle;

        let err = orch.start().unwrap_err();
        assert!(matches!(err, GameError::PreconditionViolation(_)));
        // Same round: the secret handle did not change.
        orch.refresh().unwrap();
        assert_eq!(orch.snapshot().secret_handle, secret_handle);
    }

    #[test]
    fn request_secret_while_idle_fails_fast() {
        let mut orch = orchestrator();
        let err = orch.request_secret().unwrap_err();
        assert!(matches!(err, GameError::PreconditionViolation(_)));
        // The handshake never started.
        assert_eq!(orch.handshake_phase(), HandshakePhase::Idle);
    }

    #[test]
    fn request_result_before_resolution_fails_fast() {
        let mut orch = orchestrator();
        orch.start().unwrap();
        let err = orch.request_result().unwrap_err();
        assert!(matches!(err, GameError::PreconditionViolation(_)));
        assert_eq!(orch.handshake_phase(), HandshakePhase::Idle);
    }

    #[test]
    fn out_of_range_guess_is_rejected_before_encryption() {
        let mut orch = orchestrator();
        orch.start().unwrap();
        let err = orch.submit_guess(22).unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
        // Still active; nothing was submitted.
        assert_eq!(orch.stage().unwrap(), SessionStage::Active);
    }

    #[test]
    fn request_secret_is_idempotent() {
        let mut orch = orchestrator();
        orch.start().unwrap();
        let first = orch.request_secret().unwrap();
        let second = orch.request_secret().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn restart_from_resolved_clears_cached_values() {
        let mut orch = orchestrator();
        orch.start().unwrap();
        let secret = orch.request_secret().unwrap();
        orch.submit_guess(suggested_guess_for(secret)).unwrap();
        orch.request_result().unwrap();
        assert!(orch.cached_result().is_some());

        orch.start().unwrap();
        assert_eq!(orch.snapshot().stage, SessionStage::Active);
        assert_eq!(orch.cached_result(), None);
        assert_eq!(orch.cached_secret(), None);
    }

    fn suggested_guess_for(secret: u64) -> u8 {
        crate::session::suggested_guess(secret)
    }

    #[test]
    fn declined_signature_surfaces_signer_unavailable() {
        let vault = SoftwareVault::new(42);
        vault.set_now(NOW);
        let ledger = SoftwareLedger::new(vault.clone(), contract(), 7);
        let mut orch = SessionOrchestrator::new(
            ledger,
            vault,
            RefusingSigner,
            ManualClock::at(NOW),
            contract(),
            player(),
        )
        .unwrap();

        orch.start().unwrap();
        let err = orch.request_secret().unwrap_err();
        assert!(matches!(err, GameError::SignerUnavailable(_)));
        assert_eq!(orch.handshake_phase(), HandshakePhase::Failed);
        // Failure left the session where it was.
        assert_eq!(orch.stage().unwrap(), SessionStage::Active);
    }

    #[test]
    fn audit_trail_records_failures_with_kinds() {
        let mut orch = orchestrator();
        let _ = orch.request_secret();
        orch.start().unwrap();

        let events = orch.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, SessionAction::RequestSecret);
        assert_eq!(events[0].outcome, "precondition-violation");
        assert!(events[0].detail.is_some());
        assert_eq!(events[1].action, SessionAction::Start);
        assert_eq!(events[1].outcome, "ok");
        assert_eq!(events[1].seq, 1);
    }

    #[test]
    fn offline_encryption_service_fails_submit_without_state_change() {
        let vault = SoftwareVault::new(42);
        vault.set_now(NOW);
        let signer = SoftwareSigner::new([0x11; 32]);
        vault.trust_signer(signer.verifying_key());
        let ledger = SoftwareLedger::new(vault.clone(), contract(), 7);
        let mut orch = SessionOrchestrator::new(
            ledger,
            vault.clone(),
            signer,
            ManualClock::at(NOW),
            contract(),
            player(),
        )
        .unwrap();

        orch.start().unwrap();
        vault.set_offline(true);
        let err = orch.submit_guess(10).unwrap_err();
        assert!(matches!(err, GameError::EncryptionServiceUnavailable(_)));

        vault.set_offline(false);
        assert_eq!(orch.stage().unwrap(), SessionStage::Active);
    }
}
