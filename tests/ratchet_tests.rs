//! Integration tests for the ratchet core
//!
//! Covers the end-to-end messaging properties:
//! - Encrypt/decrypt roundtrips in both directions
//! - The DH ratchet step boundary at the configured interval
//! - Out-of-order delivery in arbitrary permutations
//! - Forward secrecy of exported state snapshots
//! - Tamper detection with no partial plaintext

use meridian_core::config::Config;
use meridian_core::crypto::agreement::KeyExchangeAttempt;
use meridian_core::crypto::messaging::{MessageEnvelope, RatchetState, SerializableRatchetState};
use meridian_core::crypto::suites::ClassicSuite;
use meridian_core::error::CryptoError;
use meridian_core::protocol::wire;
use meridian_core::utils::serialization;

fn session_pair() -> (RatchetState<ClassicSuite>, RatchetState<ClassicSuite>) {
    let (attempt, offer) = KeyExchangeAttempt::<ClassicSuite>::initiate().unwrap();
    let (responder_seed, answer) = KeyExchangeAttempt::<ClassicSuite>::respond(&offer).unwrap();
    let initiator_seed = attempt.complete(&answer).unwrap();

    let alice =
        RatchetState::initialize("conv".to_string(), "alice".to_string(), &initiator_seed)
            .unwrap();
    let bob = RatchetState::initialize("conv".to_string(), "bob".to_string(), &responder_seed)
        .unwrap();
    (alice, bob)
}

fn export(state: &RatchetState<ClassicSuite>) -> RatchetState<ClassicSuite> {
    let blob = serialization::to_bytes(&state.to_serializable()).unwrap();
    let parsed: SerializableRatchetState = serialization::from_bytes(&blob).unwrap();
    RatchetState::from_serializable(parsed).unwrap()
}

/// Scenario: initiator encrypts "hello"; responder decrypts to "hello".
/// Then 150 further messages; the chain length increments by exactly one
/// at the default ratchet-step boundary and every message decrypts.
#[test]
fn test_hello_then_150_messages_with_one_ratchet_step() {
    let interval = Config::global().ratchet_step_interval;
    assert_eq!(interval, 100, "scenario assumes the default interval");

    let (mut alice, mut bob) = session_pair();

    let hello = alice.encrypt(b"hello").unwrap();
    assert_eq!(hello.chain_length, 0);
    assert_eq!(bob.decrypt(&hello).unwrap(), b"hello");

    let mut chain_lengths = Vec::new();
    for i in 0..150u32 {
        let plaintext = format!("message {}", i);
        let envelope = alice.encrypt(plaintext.as_bytes()).unwrap();
        chain_lengths.push(envelope.chain_length);
        assert_eq!(bob.decrypt(&envelope).unwrap(), plaintext.as_bytes());
    }

    // "hello" was message 0, so the boundary falls on further message 99
    assert!(chain_lengths[..99].iter().all(|&c| c == 0));
    assert!(chain_lengths[99..].iter().all(|&c| c == 1));
    assert_eq!(alice.sending_chain_length(), 1);
    assert_eq!(bob.receiving_chain_length(), 1);
}

/// All plaintexts survive an arbitrary delivery permutation within the
/// skip window.
#[test]
fn test_permuted_delivery_recovers_all_plaintexts() {
    let (mut alice, mut bob) = session_pair();

    let count = 24usize;
    let envelopes: Vec<MessageEnvelope> = (0..count)
        .map(|i| alice.encrypt(format!("msg {}", i).as_bytes()).unwrap())
        .collect();

    // A fixed permutation: reversed odds first, then evens
    let mut order: Vec<usize> = (0..count).filter(|i| i % 2 == 1).rev().collect();
    order.extend((0..count).filter(|i| i % 2 == 0));

    for i in order {
        let plaintext = bob.decrypt(&envelopes[i]).unwrap();
        assert_eq!(plaintext, format!("msg {}", i).as_bytes());
    }
    assert_eq!(bob.skipped_key_count(), 0, "all skipped keys consumed");
}

/// Out-of-order delivery across a ratchet-step boundary: the tail of the
/// previous chain is still readable after the new chain started.
#[test]
fn test_out_of_order_across_chain_boundary() {
    let (mut alice, mut bob) = session_pair();

    let mut envelopes = Vec::new();
    for i in 0..103u32 {
        envelopes.push(alice.encrypt(format!("m{}", i).as_bytes()).unwrap());
    }
    assert_eq!(envelopes[99].chain_length, 0);
    assert_eq!(envelopes[100].chain_length, 1);

    // Deliver everything except the last two chain-0 messages, then the
    // new chain, then the stragglers
    for envelope in &envelopes[..98] {
        bob.decrypt(envelope).unwrap();
    }
    assert_eq!(bob.decrypt(&envelopes[100]).unwrap(), b"m100");
    assert_eq!(bob.decrypt(&envelopes[101]).unwrap(), b"m101");
    assert_eq!(bob.decrypt(&envelopes[98]).unwrap(), b"m98");
    assert_eq!(bob.decrypt(&envelopes[99]).unwrap(), b"m99");
    assert_eq!(bob.decrypt(&envelopes[102]).unwrap(), b"m102");
}

/// Forward secrecy: a state exported before a later ratchet step cannot
/// decrypt messages sent on the post-step chain, while the live state can.
#[test]
fn test_exported_state_cannot_decrypt_after_later_ratchet_step() {
    let (mut alice, mut bob) = session_pair();

    // Some initial traffic, then snapshot Alice's state
    for i in 0..5u32 {
        let envelope = alice.encrypt(format!("early {}", i).as_bytes()).unwrap();
        bob.decrypt(&envelope).unwrap();
    }
    let mut stale_alice = export(&alice);

    // Alice crosses a step boundary so Bob learns her fresh ephemeral
    for i in 0..101u32 {
        let envelope = alice.encrypt(format!("bulk {}", i).as_bytes()).unwrap();
        bob.decrypt(&envelope).unwrap();
    }

    // Bob crosses his own boundary, ratcheting against Alice's new key
    let mut bob_envelopes = Vec::new();
    for i in 0..101u32 {
        bob_envelopes.push(bob.encrypt(format!("reply {}", i).as_bytes()).unwrap());
    }
    let post_step = bob_envelopes
        .iter()
        .find(|e| e.chain_length == 1)
        .expect("bob must have stepped");

    // The live state reads it; the stale snapshot must not
    for envelope in &bob_envelopes {
        if envelope.chain_length == 0 {
            alice.decrypt(envelope).unwrap();
        }
    }
    assert!(alice.decrypt(post_step).is_ok());
    assert!(
        stale_alice.decrypt(post_step).is_err(),
        "compromised old state must not read post-step traffic"
    );
}

/// Flipping one bit of the authentication tag raises AuthenticationError
/// and returns no plaintext; the session continues undamaged.
#[test]
fn test_bit_flip_in_tag_raises_authentication_error() {
    let (mut alice, mut bob) = session_pair();

    let mut envelope = alice.encrypt(b"sensitive").unwrap();
    // The AEAD tag occupies the trailing 16 bytes of the ciphertext
    let tag_byte = envelope.ciphertext.len() - 8;
    envelope.ciphertext[tag_byte] ^= 0x40;

    match bob.decrypt(&envelope) {
        Err(CryptoError::AuthenticationError(_)) => {}
        other => panic!("expected AuthenticationError, got {:?}", other.map(|_| ())),
    }

    // Restore the byte: the original still decrypts, state was untouched
    envelope.ciphertext[tag_byte] ^= 0x40;
    assert_eq!(bob.decrypt(&envelope).unwrap(), b"sensitive");
}

/// Envelopes survive the versioned wire codec between two sessions.
#[test]
fn test_envelope_roundtrip_through_wire_codec() {
    let (mut alice, mut bob) = session_pair();

    let envelope = alice.encrypt(b"over the wire").unwrap();
    let packed = wire::pack_message(&envelope).unwrap();
    let unpacked = wire::unpack_message(&packed).unwrap();
    assert_eq!(bob.decrypt(&unpacked).unwrap(), b"over the wire");
}

/// A regressed chain length outside the skipped-key store is a replay.
#[test]
fn test_chain_regression_is_rejected() {
    let (mut alice, mut bob) = session_pair();

    for i in 0..101u32 {
        let envelope = alice.encrypt(format!("m{}", i).as_bytes()).unwrap();
        bob.decrypt(&envelope).unwrap();
    }

    // Forge a chain-0 envelope that was never produced
    let mut forged = alice.encrypt(b"late").unwrap();
    forged.chain_length = 0;
    forged.message_number = 999;

    assert!(matches!(
        bob.decrypt(&forged),
        Err(CryptoError::ReplayError(_))
    ));
}

#[cfg(feature = "post-quantum")]
mod hybrid {
    use super::*;
    use meridian_core::crypto::suites::HybridSuite;

    fn hybrid_pair() -> (RatchetState<HybridSuite>, RatchetState<HybridSuite>) {
        let (attempt, offer) = KeyExchangeAttempt::<HybridSuite>::initiate().unwrap();
        let (responder_seed, answer) =
            KeyExchangeAttempt::<HybridSuite>::respond(&offer).unwrap();
        let initiator_seed = attempt.complete(&answer).unwrap();

        let alice =
            RatchetState::initialize("conv".to_string(), "alice".to_string(), &initiator_seed)
                .unwrap();
        let bob =
            RatchetState::initialize("conv".to_string(), "bob".to_string(), &responder_seed)
                .unwrap();
        (alice, bob)
    }

    #[test]
    fn test_hybrid_session_roundtrip() {
        let (mut alice, mut bob) = hybrid_pair();

        let envelope = alice.encrypt(b"post-quantum hello").unwrap();
        assert!(envelope.pqc_ciphertext.is_none(), "no step yet");
        assert_eq!(bob.decrypt(&envelope).unwrap(), b"post-quantum hello");
    }

    #[test]
    fn test_hybrid_step_carries_kem_ciphertext() {
        let (mut alice, mut bob) = hybrid_pair();

        let mut stepped = None;
        for i in 0..101u32 {
            let envelope = alice.encrypt(format!("m{}", i).as_bytes()).unwrap();
            if envelope.chain_length == 1 && stepped.is_none() {
                stepped = Some(envelope.clone());
            }
            assert_eq!(bob.decrypt(&envelope).unwrap(), format!("m{}", i).as_bytes());
        }

        let stepped = stepped.expect("a ratchet step must have happened");
        assert!(
            stepped.pqc_ciphertext.is_some(),
            "hybrid step must carry the KEM ciphertext"
        );
    }
}
