#![forbid(unsafe_code)]

//! Client-side protocol library for a confidential single-round "reach 21"
//! guessing game.
//!
//! The ledger stores a per-player secret and the round outcome only as
//! ciphertext handles. The player decrypts the secret locally through an
//! authenticated grant handshake, encrypts an answer bound to the game
//! contract and their own address, submits it, and decrypts the encrypted
//! boolean outcome the same way. Plaintext never crosses a third party.
//!
//! The ledger, the encryption/decryption service, and the key custody
//! signer are collaborators reached through the trait seams in
//! [`collaborators`]; [`software_stack`] provides deterministic in-process
//! implementations for tests and local simulation.

pub mod address;
pub mod ciphertext;
pub mod collaborators;
pub mod decryption_grant;
pub mod encrypted_input;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod software_stack;

pub use address::Address;
pub use ciphertext::{CiphertextHandle, EncryptedInput, InputProof};
pub use decryption_grant::{DecryptionEngine, HandshakePhase, UserDecryptRequest};
pub use encrypted_input::EncryptedInputBuilder;
pub use error::GameError;
pub use orchestrator::{SessionEvent, SessionOrchestrator};
pub use session::{SessionSnapshot, SessionStage};
