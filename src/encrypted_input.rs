//! Encrypted-input construction.
//!
//! Turns a plaintext 8-bit value into a ciphertext handle plus a validity
//! proof bound to one `(contract, submitter)` pair. The binding is the
//! replay defense: a verifier rejects the proof if either identity differs
//! at verification time, so an input built here is submittable exactly once
//! and exactly where it was built for.
//!
//! The 8-bit encoding width accepts 0–255; the game's [0, 21] guess bound is
//! caller policy, enforced by [`check_guess_range`] before an input for a
//! guess is ever built.

use crate::address::Address;
use crate::ciphertext::EncryptedInput;
use crate::collaborators::EncryptionProvider;
use crate::error::GameError;

/// Largest guess the game accepts.
pub const MAX_GUESS: u8 = 21;

/// Guess-submission policy: integers in [0, 21] only.
pub fn check_guess_range(value: u8) -> Result<(), GameError> {
    if value > MAX_GUESS {
        return Err(GameError::InvalidInput(format!(
            "guess {value} is out of range 0..={MAX_GUESS}"
        )));
    }
    Ok(())
}

/// Builds encrypted inputs bound to a fixed `(contract, submitter)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInputBuilder {
    contract: Address,
    submitter: Address,
}

impl EncryptedInputBuilder {
    /// New builder for the given identities. Both must be non-zero.
    pub fn new(contract: Address, submitter: Address) -> Result<Self, GameError> {
        if contract.is_zero() {
            return Err(GameError::InvalidInput(
                "zero contract identity".to_string(),
            ));
        }
        if submitter.is_zero() {
            return Err(GameError::InvalidInput(
                "zero submitter identity".to_string(),
            ));
        }
        Ok(Self {
            contract,
            submitter,
        })
    }

    /// Contract identity the inputs will be bound to.
    pub fn contract(&self) -> &Address {
        &self.contract
    }

    /// Submitter identity the inputs will be bound to.
    pub fn submitter(&self) -> &Address {
        &self.submitter
    }

    /// Encrypt an 8-bit value through the encryption collaborator.
    ///
    /// Purely functional from the caller's perspective; the provider may
    /// perform network calls and surfaces unreachability as
    /// `EncryptionServiceUnavailable`.
    pub fn build<P: EncryptionProvider>(
        &self,
        provider: &mut P,
        value: u8,
    ) -> Result<EncryptedInput, GameError> {
        provider.encrypt_u8(&self.contract, &self.submitter, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphertext::binding_digest;
    use crate::software_stack::SoftwareVault;

    fn builder() -> EncryptedInputBuilder {
        EncryptedInputBuilder::new(Address([1u8; 20]), Address([2u8; 20])).unwrap()
    }

    #[test]
    fn zero_identities_are_rejected() {
        assert!(matches!(
            EncryptedInputBuilder::new(Address::ZERO, Address([2u8; 20])),
            Err(GameError::InvalidInput(_))
        ));
        assert!(matches!(
            EncryptedInputBuilder::new(Address([1u8; 20]), Address::ZERO),
            Err(GameError::InvalidInput(_))
        ));
    }

    #[test]
    fn guess_policy_rejects_22_but_width_accepts_it() {
        assert!(check_guess_range(21).is_ok());
        assert!(matches!(
            check_guess_range(22),
            Err(GameError::InvalidInput(_))
        ));

        // Encoding width is 8 bits: the builder itself accepts 22.
        let mut vault = SoftwareVault::new(1);
        let input = builder().build(&mut vault, 22).unwrap();
        assert!(!input.handle.is_zero());
    }

    #[test]
    fn proof_carries_the_identity_binding() {
        let mut vault = SoftwareVault::new(1);
        let b = builder();
        let input = b.build(&mut vault, 13).unwrap();
        let expected = binding_digest(&input.handle, b.contract(), b.submitter());
        assert_eq!(input.proof.as_bytes(), expected);
    }
}
