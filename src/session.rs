//! Per-player game-session state machine.
//!
//! One round moves `Idle → Active → Resolved → Idle`. The stage is never
//! owned locally: it is re-derived from the four ledger reads every time,
//! and the derivation here is the single place that mapping lives. Local
//! copies are caches invalidated after every write.
//!
//! Legality checks fail fast with `PreconditionViolation` before any
//! collaborator is contacted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ciphertext::CiphertextHandle;
use crate::encrypted_input::{check_guess_range, MAX_GUESS};
use crate::error::GameError;

// ---------------------------------------------------------------------------
// SessionStage
// ---------------------------------------------------------------------------

/// The player's position in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStage {
    /// No round in flight; `start` is legal.
    Idle,
    /// A secret is assigned; the player may decrypt it and submit a guess.
    Active,
    /// A guess was evaluated; the encrypted outcome awaits decryption.
    /// The next `start` resets the round.
    Resolved,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Ledger-derived view of one player's session.
///
/// Built from the four ledger reads; handles that the stage says cannot be
/// present are dropped even if a stale read returned them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current stage.
    pub stage: SessionStage,
    /// Encrypted secret handle; zero unless stage is Active or Resolved.
    pub secret_handle: CiphertextHandle,
    /// Encrypted outcome handle; zero unless stage is Resolved.
    pub result_handle: CiphertextHandle,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            stage: SessionStage::Idle,
            secret_handle: CiphertextHandle::ZERO,
            result_handle: CiphertextHandle::ZERO,
        }
    }
}

impl SessionSnapshot {
    /// Derive the stage from the four ledger-exposed values.
    ///
    /// An unresolved round (`has_active_game`) is Active; otherwise a stored
    /// outcome (`has_result`) is Resolved; otherwise Idle.
    pub fn from_reads(
        has_active_game: bool,
        has_result: bool,
        secret_handle: CiphertextHandle,
        result_handle: CiphertextHandle,
    ) -> Self {
        if has_active_game {
            Self {
                stage: SessionStage::Active,
                secret_handle,
                result_handle: CiphertextHandle::ZERO,
            }
        } else if has_result {
            Self {
                stage: SessionStage::Resolved,
                secret_handle,
                result_handle,
            }
        } else {
            Self::default()
        }
    }

    /// Presence invariants: Active implies a non-zero secret handle,
    /// Resolved implies a non-zero result handle, Idle implies neither.
    pub fn invariants_hold(&self) -> bool {
        match self.stage {
            SessionStage::Idle => self.secret_handle.is_zero() && self.result_handle.is_zero(),
            SessionStage::Active => !self.secret_handle.is_zero() && self.result_handle.is_zero(),
            SessionStage::Resolved => {
                !self.secret_handle.is_zero() && !self.result_handle.is_zero()
            }
        }
    }

    /// `start` is legal from Idle, or from Resolved as a round restart.
    pub fn check_start(&self) -> Result<(), GameError> {
        match self.stage {
            SessionStage::Idle | SessionStage::Resolved => Ok(()),
            SessionStage::Active => Err(GameError::PreconditionViolation(
                "cannot start a round while one is active".to_string(),
            )),
        }
    }

    /// `request_secret` needs an Active stage and an assigned secret.
    pub fn check_request_secret(&self) -> Result<(), GameError> {
        if self.stage != SessionStage::Active {
            return Err(GameError::PreconditionViolation(format!(
                "cannot request the secret while {}",
                self.stage
            )));
        }
        if self.secret_handle.is_zero() {
            return Err(GameError::PreconditionViolation(
                "secret ciphertext not yet available".to_string(),
            ));
        }
        Ok(())
    }

    /// `submit_guess` needs an Active stage and a guess within policy.
    pub fn check_submit_guess(&self, guess: u8) -> Result<(), GameError> {
        if self.stage != SessionStage::Active {
            return Err(GameError::PreconditionViolation(format!(
                "cannot submit a guess while {}",
                self.stage
            )));
        }
        check_guess_range(guess)
    }

    /// `request_result` needs a Resolved stage and a stored outcome.
    pub fn check_request_result(&self) -> Result<(), GameError> {
        if self.stage != SessionStage::Resolved {
            return Err(GameError::PreconditionViolation(format!(
                "cannot request the result while {}",
                self.stage
            )));
        }
        if self.result_handle.is_zero() {
            return Err(GameError::PreconditionViolation(
                "result ciphertext not yet available".to_string(),
            ));
        }
        Ok(())
    }
}

/// Suggested guess for a decrypted secret: the complement to 21, floored at
/// zero. The state machine never enforces it; any value in [0, 21] is
/// forwarded and correctness is decided by the ledger's encrypted
/// comparison.
pub fn suggested_guess(secret: u64) -> u8 {
    if secret >= MAX_GUESS as u64 {
        0
    } else {
        MAX_GUESS - secret as u8
    }
}
