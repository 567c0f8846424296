//! Stress tests: concurrent tracking of the same pair.
//!
//! Sequence numbers must stay gap-free and unique however many writers
//! race. Writers sharing one engine are serialized by its pair lock; writers
//! on separate engines may lose the append race and must see `Conflict`.

use std::sync::{Arc, Mutex};
use std::thread;

use keytrack::crypto::keys::Ed25519KeyPair;
use keytrack::identity::{AuthContext, Keyring, MemoryDirectory, Session, Uid};
use keytrack::keyfamily::{DeviceKey, DeviceType, KeyFamilyGraph, KeyFamilyHandle};
use keytrack::storage::{MemoryStatementStore, StatementStore};
use keytrack::tracking::{
    verify_history, AlwaysProceed, ProofError, ProofStatus, ProofVerifier, ProofVerifierRegistry,
    SocialAssertion, TrackEngine, TrackOptions,
};
use keytrack::ErrorKind;

struct Passing;

impl ProofVerifier for Passing {
    fn verify(
        &self,
        _assertion: &SocialAssertion,
        _owner: &Uid,
    ) -> Result<ProofStatus, ProofError> {
        Ok(ProofStatus::Pass)
    }
}

fn add_user(dir: &MemoryDirectory, name: &str) -> (Uid, Ed25519KeyPair, DeviceKey) {
    let key = Ed25519KeyPair::generate();
    let device = DeviceKey::eldest(key.kid(), format!("{name}-desk"), DeviceType::Desktop, 1);
    let uid = Uid::new(format!("uid_{name}"));
    dir.add_user(uid.clone(), name, vec![device.clone()], vec![]);
    (uid, key, device)
}

fn setup() -> (Arc<MemoryDirectory>, Arc<ProofVerifierRegistry>, AuthContext, Uid, Uid) {
    let dir = Arc::new(MemoryDirectory::new());
    let (target, _, _) = add_user(&dir, "target");
    dir.add_assertion(&target, SocialAssertion::new("target", "github"))
        .unwrap();

    let (tracker, key, device) = add_user(&dir, "tracker");
    let graph = KeyFamilyGraph::build(tracker.clone(), vec![device], vec![]).unwrap();
    let mut keyring = Keyring::new();
    keyring.add_signing_key(&key);
    let auth = AuthContext::logged_in(Session::new(
        tracker.clone(),
        "tracker",
        Arc::new(KeyFamilyHandle::new(graph)),
        Arc::new(keyring),
    ));

    let registry = Arc::new(ProofVerifierRegistry::new().with("github", Arc::new(Passing)));
    (dir, registry, auth, tracker, target)
}

#[test]
fn stress_shared_engine_serializes_pair() {
    let (dir, registry, auth, tracker, target) = setup();
    let store = Arc::new(MemoryStatementStore::new());
    let engine = Arc::new(TrackEngine::new(dir, registry, store.clone()));
    let auth = Arc::new(auth);
    let sequences = Arc::new(Mutex::new(Vec::new()));

    let mut handles = vec![];
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        let auth = Arc::clone(&auth);
        let sequences = Arc::clone(&sequences);
        handles.push(thread::spawn(move || {
            for _ in 0..5 {
                let stmt = engine
                    .track(&auth, "target", TrackOptions::default(), &AlwaysProceed::default())
                    .expect("track through a shared engine should succeed");
                sequences.lock().unwrap().push(stmt.sequence_number);
            }
        }));
    }
    for h in handles {
        h.join().expect("thread should not panic");
    }

    let mut sequences = sequences.lock().unwrap().clone();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=80).collect::<Vec<u64>>());

    let history = store.history(&tracker, &target).unwrap();
    assert_eq!(history.len(), 80);
    verify_history(&history).expect("history should verify");
}

#[test]
fn stress_separate_engines_conflict_without_gaps() {
    let (dir, registry, auth, tracker, target) = setup();
    let store: Arc<dyn StatementStore> = Arc::new(MemoryStatementStore::new());
    let auth = Arc::new(auth);
    let successes = Arc::new(Mutex::new(0usize));

    let mut handles = vec![];
    for _ in 0..8 {
        // Each writer has its own engine, so only the store arbitrates.
        let engine = TrackEngine::new(dir.clone(), registry.clone(), Arc::clone(&store));
        let auth = Arc::clone(&auth);
        let successes = Arc::clone(&successes);
        handles.push(thread::spawn(move || {
            for _ in 0..10 {
                match engine.track(&auth, "target", TrackOptions::default(), &AlwaysProceed::default()) {
                    Ok(_) => *successes.lock().unwrap() += 1,
                    Err(e) => {
                        assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {e}");
                        assert!(e.is_retryable());
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().expect("thread should not panic");
    }

    let successes = *successes.lock().unwrap();
    assert!(successes >= 1);

    let history = store.history(&tracker, &target).unwrap();
    assert_eq!(history.len(), successes);
    for (i, stmt) in history.iter().enumerate() {
        assert_eq!(stmt.sequence_number, i as u64 + 1);
    }
    verify_history(&history).expect("history should verify");
    assert!(store.is_tracking(&tracker, &target).unwrap());
}

#[test]
fn stress_distinct_pairs_do_not_interfere() {
    let dir = Arc::new(MemoryDirectory::new());
    let registry = Arc::new(ProofVerifierRegistry::new().with("github", Arc::new(Passing)));
    let store = Arc::new(MemoryStatementStore::new());
    let engine = Arc::new(TrackEngine::new(dir.clone(), registry, store.clone()));

    let (tracker, key, device) = add_user(&dir, "tracker");
    let graph = KeyFamilyGraph::build(tracker.clone(), vec![device], vec![]).unwrap();
    let mut keyring = Keyring::new();
    keyring.add_signing_key(&key);
    let auth = Arc::new(AuthContext::logged_in(Session::new(
        tracker.clone(),
        "tracker",
        Arc::new(KeyFamilyHandle::new(graph)),
        Arc::new(keyring),
    )));

    let targets: Vec<Uid> = (0..10)
        .map(|i| add_user(&dir, &format!("target{i}")).0)
        .collect();

    let mut handles = vec![];
    for i in 0..10 {
        let engine = Arc::clone(&engine);
        let auth = Arc::clone(&auth);
        handles.push(thread::spawn(move || {
            for _ in 0..3 {
                engine
                    .track(
                        &auth,
                        &format!("target{i}"),
                        TrackOptions::default(),
                        &AlwaysProceed::default(),
                    )
                    .expect("track should succeed");
            }
        }));
    }
    for h in handles {
        h.join().expect("thread should not panic");
    }

    assert_eq!(store.len(), 30);
    for target in &targets {
        let latest = store.latest(&tracker, target).unwrap().unwrap();
        assert_eq!(latest.sequence_number, 3);
    }
}
