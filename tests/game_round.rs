use veiled_twentyone::address::Address;
use veiled_twentyone::collaborators::GameLedger;
use veiled_twentyone::decryption_grant::{DecryptionEngine, HandleRequest};
use veiled_twentyone::encrypted_input::EncryptedInputBuilder;
use veiled_twentyone::orchestrator::SessionOrchestrator;
use veiled_twentyone::session::{suggested_guess, SessionStage};
use veiled_twentyone::software_stack::{ManualClock, SoftwareLedger, SoftwareSigner, SoftwareVault};

const NOW: i64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn contract() -> Address {
    Address([0xC0; 20])
}

fn player() -> Address {
    Address([0xA1; 20])
}

fn stack(seed: u64) -> (SoftwareVault, SoftwareLedger, SoftwareSigner, ManualClock) {
    let vault = SoftwareVault::new(seed);
    vault.set_now(NOW);
    let signer = SoftwareSigner::new([0x11; 32]);
    vault.trust_signer(signer.verifying_key());
    let ledger = SoftwareLedger::new(vault.clone(), contract(), seed);
    (vault, ledger, signer, ManualClock::at(NOW))
}

fn orchestrator_with_secret(
    secret: u64,
) -> SessionOrchestrator<SoftwareLedger, SoftwareVault, SoftwareSigner, ManualClock> {
    let (vault, ledger, signer, clock) = stack(42);
    ledger.set_next_secret(secret);
    SessionOrchestrator::new(ledger, vault, signer, clock, contract(), player()).unwrap()
}

// ---------------------------------------------------------------------------
// Scenario tests
// ---------------------------------------------------------------------------

#[test]
fn secret_nine_guess_twelve_wins() {
    let mut orch = orchestrator_with_secret(9);
    orch.start().unwrap();
    assert_eq!(orch.request_secret().unwrap(), 9);
    assert_eq!(orch.suggested_guess(), Some(12));

    orch.submit_guess(12).unwrap();
    assert!(orch.request_result().unwrap());
}

#[test]
fn secret_nine_guess_five_loses() {
    let mut orch = orchestrator_with_secret(9);
    orch.start().unwrap();
    assert_eq!(orch.request_secret().unwrap(), 9);

    // Any value in [0, 21] is forwarded; correctness is decided by the
    // ledger's encrypted comparison.
    orch.submit_guess(5).unwrap();
    assert!(!orch.request_result().unwrap());
}

#[test]
fn stage_and_handle_invariants_hold_across_a_round() {
    let mut orch = orchestrator_with_secret(4);

    assert_eq!(orch.stage().unwrap(), SessionStage::Idle);
    assert!(orch.snapshot().invariants_hold());

    orch.start().unwrap();
    assert_eq!(orch.snapshot().stage, SessionStage::Active);
    assert!(orch.snapshot().invariants_hold());
    assert!(!orch.snapshot().secret_handle.is_zero());

    let secret = orch.request_secret().unwrap();
    orch.submit_guess(suggested_guess(secret)).unwrap();
    assert_eq!(orch.snapshot().stage, SessionStage::Resolved);
    assert!(orch.snapshot().invariants_hold());
    assert!(!orch.snapshot().result_handle.is_zero());
}

#[test]
fn a_new_round_assigns_a_fresh_secret_handle() {
    let mut orch = orchestrator_with_secret(9);
    orch.start().unwrap();
    let first_handle = orch.snapshot().secret_handle;
    let secret = orch.request_secret().unwrap();
    orch.submit_guess(suggested_guess(secret)).unwrap();
    orch.request_result().unwrap();

    orch.start().unwrap();
    assert_eq!(orch.snapshot().stage, SessionStage::Active);
    assert_ne!(orch.snapshot().secret_handle, first_handle);
}

// ---------------------------------------------------------------------------
// Round-trip property
// ---------------------------------------------------------------------------

#[test]
fn encrypted_comparison_matches_plaintext_comparison_for_the_full_grid() {
    let (mut vault, mut ledger, signer, clock) = stack(7);
    let builder = EncryptedInputBuilder::new(contract(), player()).unwrap();
    let mut engine = DecryptionEngine::new();

    for secret in 1..=20u64 {
        for guess in 0..=21u8 {
            ledger.set_next_secret(secret);
            ledger.start_game(&player()).unwrap();

            let input = builder.build(&mut vault, guess).unwrap();
            ledger.submit_encrypted_guess(&player(), &input).unwrap();

            let result_handle = ledger.encrypted_result(&player()).unwrap();
            let plaintext = engine
                .decrypt_one(
                    &mut vault,
                    &signer,
                    &clock,
                    result_handle,
                    contract(),
                    &player(),
                )
                .unwrap();

            let expected = secret + guess as u64 == 21;
            assert_eq!(
                plaintext == 1,
                expected,
                "secret {secret}, guess {guess}: ledger said {plaintext}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Multi-handle handshake
// ---------------------------------------------------------------------------

#[test]
fn one_handshake_covers_both_round_handles() {
    let (mut vault, mut ledger, signer, clock) = stack(9);
    ledger.set_next_secret(13);
    ledger.start_game(&player()).unwrap();

    let builder = EncryptedInputBuilder::new(contract(), player()).unwrap();
    let input = builder.build(&mut vault, 8).unwrap();
    ledger.submit_encrypted_guess(&player(), &input).unwrap();

    let secret_handle = ledger.encrypted_secret(&player()).unwrap();
    let result_handle = ledger.encrypted_result(&player()).unwrap();

    let mut engine = DecryptionEngine::new();
    let requests = [
        HandleRequest {
            handle: secret_handle,
            contract: contract(),
        },
        HandleRequest {
            handle: result_handle,
            contract: contract(),
        },
    ];
    let plaintexts = engine
        .decrypt(&mut vault, &signer, &clock, &requests, &player())
        .unwrap();

    assert_eq!(plaintexts.get(&secret_handle), Some(&13));
    assert_eq!(plaintexts.get(&result_handle), Some(&1));
}
