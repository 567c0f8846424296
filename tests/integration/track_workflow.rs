//! Integration test: tracking end to end.
//!
//! Covers the tracking lifecycle against in-memory and file-backed stores:
//! 1. First statement for a pair, with every proof passing
//! 2. Re-tracking after the target rotates a device key
//! 3. Logged-out and keyless targets, which must not touch the store
//! 4. Corrupt key families, reported verbatim
//! 5. History verification and untrack

use std::sync::Arc;

use keytrack::crypto::keys::Ed25519KeyPair;
use keytrack::identity::{AuthContext, Keyring, MemoryDirectory, Session, Uid};
use keytrack::keyfamily::{DeviceKey, DeviceType, KeyFamilyGraph, KeyFamilyHandle, RevokedKey};
use keytrack::storage::{FileStatementStore, MemoryStatementStore, StatementStore};
use keytrack::time::ManualClock;
use keytrack::tracking::{
    verify_history, AlwaysProceed, ProofError, ProofStatus, ProofVerifier, ProofVerifierRegistry,
    SocialAssertion, StrictDecider, TrackEngine, TrackOptions,
};
use keytrack::ErrorKind;

struct Fixed(ProofStatus);

impl ProofVerifier for Fixed {
    fn verify(
        &self,
        _assertion: &SocialAssertion,
        _owner: &Uid,
    ) -> Result<ProofStatus, ProofError> {
        Ok(self.0)
    }
}

struct World {
    directory: Arc<MemoryDirectory>,
    registry: Arc<ProofVerifierRegistry>,
    clock: Arc<ManualClock>,
    tracker: AuthContext,
    tracker_uid: Uid,
    alice_uid: Uid,
    alice_eldest: DeviceKey,
    alice_phone: DeviceKey,
}

/// Tracker `t` (logged in) and target `alice` with a desktop eldest key,
/// a phone sibkey, and proofs on github and twitter.
fn world() -> World {
    let directory = Arc::new(MemoryDirectory::new());

    let alice_uid = Uid::new("uid_alice");
    let alice_eldest = DeviceKey::eldest(
        Ed25519KeyPair::generate().kid(),
        "alice-desktop",
        DeviceType::Desktop,
        100,
    );
    let alice_phone = DeviceKey::sibkey(
        Ed25519KeyPair::generate().kid(),
        "alice-phone",
        DeviceType::Mobile,
        &alice_eldest.kid,
        200,
    );
    directory.add_user(
        alice_uid.clone(),
        "alice",
        vec![alice_eldest.clone(), alice_phone.clone()],
        vec![],
    );
    directory
        .add_assertion(&alice_uid, SocialAssertion::new("alice", "github"))
        .unwrap();
    directory
        .add_assertion(&alice_uid, SocialAssertion::new("alice_tw", "twitter"))
        .unwrap();

    let tracker_uid = Uid::new("uid_t");
    let tracker_key = Ed25519KeyPair::generate();
    let tracker_device = DeviceKey::eldest(tracker_key.kid(), "t-desktop", DeviceType::Desktop, 50);
    directory.add_user(tracker_uid.clone(), "t", vec![tracker_device.clone()], vec![]);
    let graph = KeyFamilyGraph::build(tracker_uid.clone(), vec![tracker_device], vec![]).unwrap();
    let mut keyring = Keyring::new();
    keyring.add_signing_key(&tracker_key);
    let session = Session::new(
        tracker_uid.clone(),
        "t",
        Arc::new(KeyFamilyHandle::new(graph)),
        Arc::new(keyring),
    );

    let registry = ProofVerifierRegistry::new()
        .with("github", Arc::new(Fixed(ProofStatus::Pass)))
        .with("twitter", Arc::new(Fixed(ProofStatus::Pass)));

    World {
        directory,
        registry: Arc::new(registry),
        clock: Arc::new(ManualClock::new(1_000)),
        tracker: AuthContext::logged_in(session),
        tracker_uid,
        alice_uid,
        alice_eldest,
        alice_phone,
    }
}

fn engine(world: &World, store: Arc<dyn StatementStore>) -> TrackEngine {
    TrackEngine::new(world.directory.clone(), world.registry.clone(), store)
        .with_clock(world.clock.clone())
}

#[test]
fn track_first_statement_with_passing_proofs() {
    let w = world();
    let store = Arc::new(MemoryStatementStore::new());
    let engine = engine(&w, store.clone());

    let stmt = engine
        .track(&w.tracker, "alice", TrackOptions::default(), &StrictDecider)
        .expect("tracking alice should succeed");

    assert_eq!(stmt.sequence_number, 1);
    assert_eq!(stmt.supersedes_sequence, None);
    assert_eq!(stmt.proof_results.len(), 2);
    assert!(stmt.proof_results.iter().all(|r| r.status == ProofStatus::Pass));
    assert_eq!(stmt.proof_results[0].assertion.service, "github");
    assert_eq!(stmt.proof_results[1].assertion.service, "twitter");
    assert_eq!(stmt.trackee_key_fingerprints.len(), 2);
    assert!(!stmt.local_only);
    stmt.verify_signature().expect("statement should be signed");
    assert_eq!(store.len(), 1);
}

#[test]
fn track_again_after_device_key_rotation() {
    let w = world();
    let store = Arc::new(MemoryStatementStore::new());
    let engine = engine(&w, store.clone());
    let decider = AlwaysProceed::default();

    let first = engine
        .track(&w.tracker, "alice", TrackOptions::default(), &decider)
        .unwrap();

    // Alice loses her phone and provisions a new one.
    w.clock.advance(1_000);
    let new_phone = DeviceKey::sibkey(
        Ed25519KeyPair::generate().kid(),
        "alice-phone-2",
        DeviceType::Mobile,
        &w.alice_eldest.kid,
        1_500,
    );
    let revoked = RevokedKey {
        key: w.alice_phone.clone(),
        revoked_at: 1_400,
        revoked_by: w.alice_eldest.kid.clone(),
    };
    w.directory
        .set_keys(
            &w.alice_uid,
            vec![w.alice_eldest.clone(), w.alice_phone.clone(), new_phone.clone()],
            vec![revoked],
        )
        .unwrap();

    let second = engine
        .track(&w.tracker, "alice", TrackOptions::default(), &decider)
        .unwrap();

    assert_eq!(second.sequence_number, 2);
    assert_eq!(second.supersedes_sequence, Some(1));
    assert_ne!(second.trackee_key_fingerprints, first.trackee_key_fingerprints);
    assert!(second.trackee_key_fingerprints.contains(&new_phone.kid));
    assert!(!second.trackee_key_fingerprints.contains(&w.alice_phone.kid));

    let history = engine.history(&w.tracker_uid, &w.alice_uid).unwrap();
    assert_eq!(history.len(), 2);
    verify_history(&history).expect("history should verify");
}

#[test]
fn track_while_logged_out_leaves_store_untouched() {
    let w = world();
    let store = Arc::new(MemoryStatementStore::new());
    let engine = engine(&w, store.clone());

    let err = engine
        .track(
            &AuthContext::logged_out(),
            "alice",
            TrackOptions::default(),
            &AlwaysProceed::default(),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoginRequired);
    assert!(store.is_empty());
    assert!(!engine.is_tracking(&w.tracker_uid, &w.alice_uid).unwrap());
}

#[test]
fn track_user_without_verifiable_key_fails_before_signing() {
    let w = world();
    let bob = Uid::new("uid_bob");
    let expired = DeviceKey::eldest(
        Ed25519KeyPair::generate().kid(),
        "bob-desktop",
        DeviceType::Desktop,
        10,
    )
    .with_expiry(500);
    w.directory.add_user(bob, "bob", vec![expired], vec![]);

    let store = Arc::new(MemoryStatementStore::new());
    let engine = engine(&w, store.clone());
    let err = engine
        .track(&w.tracker, "bob", TrackOptions::default(), &AlwaysProceed::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoVerifiableKey);
    assert!(store.is_empty());
}

#[test]
fn track_user_with_corrupt_key_family_reports_corruption() {
    let w = world();
    let mallory = Uid::new("uid_mallory");
    let a = Ed25519KeyPair::generate().kid();
    let b = Ed25519KeyPair::generate().kid();
    let key_a = DeviceKey::sibkey(a.clone(), "m-1", DeviceType::Desktop, &b, 10);
    let key_b = DeviceKey::sibkey(b, "m-2", DeviceType::Mobile, &a, 10);
    w.directory.add_user(mallory, "mallory", vec![key_a, key_b], vec![]);

    let engine = engine(&w, Arc::new(MemoryStatementStore::new()));
    let err = engine
        .track(&w.tracker, "mallory", TrackOptions::default(), &AlwaysProceed::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cycle);
    assert!(err.kind().is_graph_corruption());
}

#[test]
fn strict_decider_rejects_failed_proof_but_local_only_proceeds() {
    let w = world();
    let registry = ProofVerifierRegistry::new()
        .with("github", Arc::new(Fixed(ProofStatus::Pass)))
        .with("twitter", Arc::new(Fixed(ProofStatus::Fail)));
    let store = Arc::new(MemoryStatementStore::new());
    let engine = TrackEngine::new(w.directory.clone(), Arc::new(registry), store.clone())
        .with_clock(w.clock.clone());

    let err = engine
        .track(&w.tracker, "alice", TrackOptions::default(), &StrictDecider)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentityVerification);
    assert!(store.is_empty());

    let stmt = engine
        .track(&w.tracker, "alice", TrackOptions::local_only(), &StrictDecider)
        .unwrap();
    assert!(stmt.local_only);
    assert_eq!(stmt.sequence_number, 1);
}

#[test]
fn local_only_statements_share_the_sequence_stream() {
    let w = world();
    let engine = engine(&w, Arc::new(MemoryStatementStore::new()));
    let decider = AlwaysProceed::default();

    let local = engine
        .track(&w.tracker, "alice", TrackOptions::local_only(), &decider)
        .unwrap();
    let remote = engine
        .track(&w.tracker, "alice", TrackOptions::default(), &decider)
        .unwrap();
    assert_eq!((local.sequence_number, remote.sequence_number), (1, 2));
    assert!(local.local_only && !remote.local_only);
}

#[test]
fn track_by_assertion_with_file_store() {
    let w = world();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStatementStore::new(dir.path()).unwrap());
    let engine = engine(&w, store.clone());

    let stmt = engine
        .track(
            &w.tracker,
            "alice_tw@twitter",
            TrackOptions::default(),
            &AlwaysProceed::default(),
        )
        .unwrap();
    assert_eq!(stmt.trackee_uid, w.alice_uid);

    // A fresh store over the same directory sees the statement.
    let reopened = FileStatementStore::new(dir.path()).unwrap();
    let latest = reopened
        .latest(&w.tracker_uid, &w.alice_uid)
        .unwrap()
        .expect("statement should be on disk");
    assert_eq!(latest, stmt);

    engine.untrack(&w.tracker_uid, &w.alice_uid).unwrap();
    assert!(!reopened.is_tracking(&w.tracker_uid, &w.alice_uid).unwrap());
    assert_eq!(reopened.history(&w.tracker_uid, &w.alice_uid).unwrap().len(), 1);
}

#[test]
fn unknown_and_ambiguous_targets_fail_resolution() {
    let w = world();
    let engine = engine(&w, Arc::new(MemoryStatementStore::new()));
    let decider = AlwaysProceed::default();

    let err = engine
        .track(&w.tracker, "nobody", TrackOptions::default(), &decider)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);

    w.directory
        .add_assertion(&w.tracker_uid, SocialAssertion::new("alice", "github"))
        .unwrap();
    let err = engine
        .track(&w.tracker, "alice@github", TrackOptions::default(), &decider)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
}
