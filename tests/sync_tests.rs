//! Integration tests for multi-device key synchronization
//!
//! Covers:
//! - End-to-end sync package flow (create → wire → process → import)
//! - Deterministic conflict resolution across independent engines
//! - Offline queue priority ordering across a connectivity transition

use std::sync::Arc;

use meridian_core::crypto::agreement::KeyExchangeAttempt;
use meridian_core::crypto::messaging::RatchetEngine;
use meridian_core::crypto::negotiation::{AlgorithmCapabilities, AlgorithmNegotiator};
use meridian_core::crypto::suites::ClassicSuite;
use meridian_core::crypto::AlgorithmMode;
use meridian_core::identity::{DeviceIdentityRegistry, DeviceType};
use meridian_core::protocol::wire;
use meridian_core::state::events::{ConnectionQuality, ConnectivityState, EventBus};
use meridian_core::storage::MemoryStorage;
use meridian_core::sync::conflict::{ConflictResolutionEngine, ConflictStrategy, KeyVersion};
use meridian_core::sync::package::{KeyType, SyncPriority};
use meridian_core::sync::queue::{OfflineQueueItem, OfflineSyncQueue};
use meridian_core::sync::service::{CrossDeviceSyncService, ImportOutcome};

fn registries() -> (
    DeviceIdentityRegistry<ClassicSuite>,
    DeviceIdentityRegistry<ClassicSuite>,
    String,
) {
    let mut laptop = DeviceIdentityRegistry::<ClassicSuite>::new();
    let laptop_identity = laptop
        .create_device_identity("user", "laptop", DeviceType::Desktop)
        .unwrap();

    let mut phone = DeviceIdentityRegistry::<ClassicSuite>::new();
    let phone_identity = phone
        .create_device_identity("user", "phone", DeviceType::Mobile)
        .unwrap();

    laptop.register_peer_device(phone_identity.clone()).unwrap();
    phone.register_peer_device(laptop_identity).unwrap();

    (laptop, phone, phone_identity.device_id)
}

/// A ratchet state created on one device travels in a sync package over
/// the wire codec and, once imported, decrypts subsequent conversation
/// traffic on the second device.
#[test]
fn test_ratchet_state_sync_between_devices() {
    let events = Arc::new(EventBus::new());
    let (laptop_registry, phone_registry, phone_device_id) = registries();

    // A conversation exists between the user's laptop and a contact
    let (attempt, offer) = KeyExchangeAttempt::<ClassicSuite>::initiate().unwrap();
    let (contact_seed, answer) = KeyExchangeAttempt::<ClassicSuite>::respond(&offer).unwrap();
    let laptop_seed = attempt.complete(&answer).unwrap();

    let mut laptop_ratchet =
        RatchetEngine::<ClassicSuite>::new(Box::new(MemoryStorage::new()), events.clone());
    laptop_ratchet.initialize("conv", "user", &laptop_seed).unwrap();
    let mut contact_ratchet =
        RatchetEngine::<ClassicSuite>::new(Box::new(MemoryStorage::new()), events.clone());
    contact_ratchet
        .initialize("conv", "contact", &contact_seed)
        .unwrap();

    // Package the laptop's ratchet state for the phone
    let sender_service = CrossDeviceSyncService::<ClassicSuite>::new(events.clone());
    let state_blob = laptop_ratchet.export_state("conv", "user").unwrap();
    let package = sender_service
        .create_key_sync_package(
            &laptop_registry,
            &state_blob,
            KeyType::RatchetState,
            &phone_device_id,
            None,
        )
        .unwrap();

    // Transport leg
    let raw = wire::pack_sync_package(&package).unwrap();
    let received = wire::unpack_sync_package(&raw).unwrap();

    // The phone verifies, decrypts and imports atomically
    let mut phone_registry = phone_registry;
    let mut receiver_service = CrossDeviceSyncService::<ClassicSuite>::new(events.clone());
    let mut phone_ratchet =
        RatchetEngine::<ClassicSuite>::new(Box::new(MemoryStorage::new()), events);

    let outcome = receiver_service
        .process_key_sync_package(&mut phone_registry, &received, |material| {
            phone_ratchet.import_state("conv", "user", material)
        })
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Imported);

    // The contact keeps talking; the phone can read the traffic
    let envelope = contact_ratchet.encrypt("conv", "contact", b"hi all devices").unwrap();
    assert_eq!(
        phone_ratchet.decrypt("conv", "user", &envelope).unwrap(),
        b"hi all devices"
    );

    // Duplicate delivery changes nothing
    let outcome = receiver_service
        .process_key_sync_package(&mut phone_registry, &received, |_| {
            panic!("import must not run twice")
        })
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Duplicate);
}

fn version(device: &str, number: u64, timestamp: i64, hash: u8, trust: u8) -> KeyVersion {
    KeyVersion {
        device_id: device.to_string(),
        version: number,
        timestamp,
        content_hash: vec![hash; 32],
        trust_score: trust,
    }
}

/// Scenario: D1 and D2 update the same key to version 5 with different
/// payloads at t1 < t2. latest_wins selects D2; highest_trust selects
/// the device with the higher score regardless of timestamp.
#[test]
fn test_conflict_strategies_follow_the_scenario() {
    let events = Arc::new(EventBus::new());
    let versions = vec![
        version("D1", 5, 1_000, 0xAA, 80),
        version("D2", 5, 2_000, 0xBB, 20),
    ];

    let mut engine =
        ConflictResolutionEngine::new(Box::new(MemoryStorage::new()), events.clone());
    let mut conflict = engine.detect_conflict("conversation-key", &versions).unwrap();
    let latest = engine
        .resolve_conflict(&mut conflict, ConflictStrategy::LatestWins)
        .unwrap();
    assert_eq!(latest.winner.unwrap().device_id, "D2");

    let mut engine = ConflictResolutionEngine::new(Box::new(MemoryStorage::new()), events);
    let mut conflict = engine.detect_conflict("conversation-key", &versions).unwrap();
    let trusted = engine
        .resolve_conflict(&mut conflict, ConflictStrategy::HighestTrust)
        .unwrap();
    assert_eq!(trusted.winner.unwrap().device_id, "D1");
}

/// Two engines resolving the same conflict independently converge on the
/// same winner for every strategy.
#[test]
fn test_independent_engines_converge() {
    let versions = vec![
        version("D1", 5, 1_000, 0xAA, 50),
        version("D2", 5, 2_000, 0xBB, 50),
        version("D3", 5, 1_500, 0xAA, 70),
    ];

    for strategy in [
        ConflictStrategy::LatestWins,
        ConflictStrategy::HighestTrust,
        ConflictStrategy::Consensus,
    ] {
        let events = Arc::new(EventBus::new());
        let mut first =
            ConflictResolutionEngine::new(Box::new(MemoryStorage::new()), events.clone());
        let mut second = ConflictResolutionEngine::new(Box::new(MemoryStorage::new()), events);

        let mut c1 = first.detect_conflict("k", &versions).unwrap();
        let mut c2 = second.detect_conflict("k", &versions).unwrap();

        let r1 = first.resolve_conflict(&mut c1, strategy.clone()).unwrap();
        let r2 = second.resolve_conflict(&mut c2, strategy).unwrap();
        assert_eq!(r1.winner, r2.winner, "devices must converge");
    }
}

/// After a connectivity transition to online, every critical item is
/// delivered before any low-priority item from the same queue.
#[test]
fn test_critical_delivered_before_low_after_reconnect() {
    let events = Arc::new(EventBus::new());
    let mut queue =
        OfflineSyncQueue::new(Box::new(MemoryStorage::new()), events).unwrap();

    for i in 0..5 {
        queue
            .enqueue(OfflineQueueItem::new(
                "conv",
                KeyType::PreKey,
                vec![i],
                SyncPriority::Low,
            ))
            .unwrap();
        queue
            .enqueue(OfflineQueueItem::new(
                "conv",
                KeyType::Revocation,
                vec![i],
                SyncPriority::Critical,
            ))
            .unwrap();
    }

    assert!(queue.on_connectivity_change(ConnectivityState::Online(ConnectionQuality::Fair)));

    let mut deliveries = Vec::new();
    queue
        .drain(|batch| {
            for item in batch {
                deliveries.push(item.priority);
            }
            Ok(())
        })
        .unwrap();

    let first_low = deliveries
        .iter()
        .position(|p| *p == SyncPriority::Low)
        .unwrap();
    let last_critical = deliveries
        .iter()
        .rposition(|p| *p == SyncPriority::Critical)
        .unwrap();
    assert!(
        last_critical < first_low,
        "all critical items precede any low item"
    );
}

/// Negotiation picks the strongest mutual mode, and the static fallback
/// stays an explicitly separate mode.
#[test]
fn test_negotiated_mode_matches_capabilities() {
    let modern = AlgorithmCapabilities::local();
    let negotiated = AlgorithmNegotiator::negotiate(&modern, &modern).unwrap();
    #[cfg(feature = "post-quantum")]
    assert_eq!(negotiated.mode, AlgorithmMode::Hybrid);
    #[cfg(not(feature = "post-quantum"))]
    assert_eq!(negotiated.mode, AlgorithmMode::Classical);

    let legacy = AlgorithmCapabilities {
        supported_suites: vec![1],
        allow_static_fallback: false,
    };
    let negotiated = AlgorithmNegotiator::negotiate(&modern, &legacy).unwrap();
    assert_eq!(negotiated.mode, AlgorithmMode::Classical);
}
