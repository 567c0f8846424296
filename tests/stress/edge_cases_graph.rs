//! Edge case tests: key family graph validation.
//!
//! Every structural defect must be reported as its own error kind and
//! never silently repaired.

use keytrack::crypto::keys::{Ed25519KeyPair, X25519KeyPair};
use keytrack::keyfamily::{
    DeviceKey, DeviceType, KeyClass, KeyFamilyGraph, KeyFamilyHandle, KeyStatus, Kid, RevokedKey,
};
use keytrack::{ErrorKind, TrustError, Uid};

fn sig() -> Kid {
    Ed25519KeyPair::generate().kid()
}

fn uid() -> Uid {
    Uid::new("uid_edge")
}

fn build(keys: Vec<DeviceKey>, revocations: Vec<RevokedKey>) -> Result<KeyFamilyGraph, TrustError> {
    KeyFamilyGraph::build(uid(), keys, revocations)
}

fn revoke(key: &DeviceKey, by: &DeviceKey, at: u64) -> RevokedKey {
    RevokedKey {
        key: key.clone(),
        revoked_at: at,
        revoked_by: by.kid.clone(),
    }
}

#[test]
fn edge_empty_family_has_no_signing_key() {
    let graph = build(vec![], vec![]).expect("empty family is structurally valid");
    assert!(graph.is_empty());
    let err = graph.active_signing_key(1_000).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoVerifiableKey);
}

#[test]
fn edge_two_key_cycle() {
    let (a, b) = (sig(), sig());
    let keys = vec![
        DeviceKey::sibkey(a.clone(), "dev-a", DeviceType::Desktop, &b, 1),
        DeviceKey::sibkey(b, "dev-b", DeviceType::Mobile, &a, 1),
    ];
    assert_eq!(build(keys, vec![]).unwrap_err().kind(), ErrorKind::Cycle);
}

#[test]
fn edge_self_parent_is_a_cycle() {
    let a = sig();
    let keys = vec![DeviceKey::sibkey(a.clone(), "dev-a", DeviceType::Desktop, &a, 1)];
    assert_eq!(build(keys, vec![]).unwrap_err().kind(), ErrorKind::Cycle);
}

#[test]
fn edge_cycle_hanging_off_a_valid_root() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let (a, b, c) = (sig(), sig(), sig());
    let keys = vec![
        eldest,
        DeviceKey::sibkey(a.clone(), "dev-a", DeviceType::Desktop, &c, 2),
        DeviceKey::sibkey(b.clone(), "dev-b", DeviceType::Desktop, &a, 2),
        DeviceKey::sibkey(c, "dev-c", DeviceType::Desktop, &b, 2),
    ];
    assert_eq!(build(keys, vec![]).unwrap_err().kind(), ErrorKind::Cycle);
}

#[test]
fn edge_dangling_parent() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let orphan = DeviceKey::sibkey(sig(), "orphan", DeviceType::Mobile, &sig(), 2);
    let orphan_kid = orphan.kid.clone();
    match build(vec![eldest, orphan], vec![]) {
        Err(TrustError::DanglingParent { kid, parent }) => {
            assert_eq!(kid, orphan_kid);
            assert!(parent.is_some());
        }
        other => panic!("expected DanglingParent, got {other:?}"),
    }
}

#[test]
fn edge_non_eldest_without_parent_is_dangling() {
    let mut key = DeviceKey::sibkey(sig(), "dev", DeviceType::Desktop, &sig(), 1);
    key.parent_id = None;
    assert_eq!(
        build(vec![key], vec![]).unwrap_err().kind(),
        ErrorKind::DanglingParent
    );
}

#[test]
fn edge_duplicate_device_among_live_signing_keys() {
    let eldest = DeviceKey::eldest(sig(), "laptop", DeviceType::Desktop, 1);
    let twin = DeviceKey::sibkey(sig(), "laptop", DeviceType::Desktop, &eldest.kid, 2);
    match build(vec![eldest, twin], vec![]) {
        Err(TrustError::DuplicateDevice { device_id }) => assert_eq!(device_id, "laptop"),
        other => panic!("expected DuplicateDevice, got {other:?}"),
    }
}

#[test]
fn edge_device_id_reusable_after_revocation() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let old_phone = DeviceKey::sibkey(sig(), "phone", DeviceType::Mobile, &eldest.kid, 2);
    let new_phone = DeviceKey::sibkey(sig(), "phone", DeviceType::Mobile, &eldest.kid, 10);
    let revoked = revoke(&old_phone, &eldest, 5);
    let graph = build(vec![eldest, old_phone.clone(), new_phone.clone()], vec![revoked])
        .expect("revoked key frees its device id");
    assert!(graph.is_revoked(&old_phone.kid));
    assert!(graph.is_active(&new_phone.kid, 20));
}

#[test]
fn edge_encryption_subkey_shares_device_with_its_parent() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let subkey = DeviceKey::subkey(X25519KeyPair::generate().kid(), &eldest, 2);
    let graph = build(vec![eldest, subkey], vec![]).expect("subkeys are not device-unique");
    assert_eq!(graph.encryption_keys(10).len(), 1);
}

#[test]
fn edge_duplicate_kid() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    assert_eq!(
        build(vec![eldest.clone(), eldest], vec![]).unwrap_err().kind(),
        ErrorKind::DuplicateKid
    );
}

#[test]
fn edge_multiple_live_eldest_keys() {
    let first = DeviceKey::eldest(sig(), "old-root", DeviceType::Desktop, 1);
    let second = DeviceKey::eldest(sig(), "new-root", DeviceType::Desktop, 2);
    match build(vec![first, second], vec![]) {
        Err(TrustError::MultipleEldest { kids }) => assert_eq!(kids.len(), 2),
        other => panic!("expected MultipleEldest, got {other:?}"),
    }
}

#[test]
fn edge_replaced_eldest_after_reset() {
    let first = DeviceKey::eldest(sig(), "old-root", DeviceType::Desktop, 1)
        .with_status(KeyStatus::Inactive);
    let second = DeviceKey::eldest(sig(), "new-root", DeviceType::Desktop, 2);
    let graph = build(vec![first, second.clone()], vec![]).expect("inactive eldest is allowed");
    assert_eq!(graph.active_signing_key(10).unwrap().kid, second.kid);
}

#[test]
fn edge_key_created_after_parent_revocation() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let parent = DeviceKey::sibkey(sig(), "phone", DeviceType::Mobile, &eldest.kid, 2);
    let late_child = DeviceKey::sibkey(sig(), "tablet", DeviceType::Mobile, &parent.kid, 20);
    let revoked = revoke(&parent, &eldest, 10);
    assert_eq!(
        build(vec![eldest, parent, late_child], vec![revoked])
            .unwrap_err()
            .kind(),
        ErrorKind::RevokedParent
    );
}

#[test]
fn edge_key_created_before_parent_revocation_is_valid_but_inactive() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let parent = DeviceKey::sibkey(sig(), "phone", DeviceType::Mobile, &eldest.kid, 2);
    let child = DeviceKey::sibkey(sig(), "tablet", DeviceType::Mobile, &parent.kid, 5);
    let revoked = revoke(&parent, &eldest, 10);
    let graph = build(vec![eldest.clone(), parent, child.clone()], vec![revoked]).unwrap();
    assert!(!graph.is_active(&child.kid, 20));
    assert!(graph.is_active(&eldest.kid, 20));
    assert_eq!(graph.fingerprints(20).len(), 1);
}

#[test]
fn edge_expiry_is_inclusive() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1).with_expiry(100);
    let graph = build(vec![eldest.clone()], vec![]).unwrap();
    assert!(graph.is_active(&eldest.kid, 99));
    assert!(!graph.is_active(&eldest.kid, 100));
}

#[test]
fn edge_paper_key_children_are_backup_keys() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let paper = DeviceKey::sibkey(sig(), "paper-1", DeviceType::Paper, &eldest.kid, 2);
    let backup = DeviceKey::subkey(X25519KeyPair::generate().kid(), &paper, 3);
    let device = DeviceKey::subkey(X25519KeyPair::generate().kid(), &eldest, 3);
    let graph = build(
        vec![eldest, paper, backup.clone(), device.clone()],
        vec![],
    )
    .unwrap();
    assert_eq!(graph.classify(&backup.kid), KeyClass::Backup);
    assert_eq!(graph.classify(&device.kid), KeyClass::Device);
    assert_eq!(graph.classify(&sig()), KeyClass::Unknown);
}

#[test]
fn edge_long_sibkey_chain() {
    let eldest = DeviceKey::eldest(sig(), "device-0", DeviceType::Desktop, 1);
    let mut keys = vec![eldest];
    for i in 1..300u64 {
        let parent = keys[keys.len() - 1].kid.clone();
        keys.push(DeviceKey::sibkey(
            sig(),
            format!("device-{i}"),
            DeviceType::Mobile,
            &parent,
            i + 1,
        ));
    }
    let tail = keys[keys.len() - 1].kid.clone();

    let graph = build(keys, vec![]).expect("deep chains are valid");
    assert_eq!(graph.len(), 300);
    assert!(graph.is_active(&tail, 1_000));
    assert_eq!(graph.fingerprints(1_000).len(), 300);
    assert_eq!(graph.sibkeys(1_000).len(), 299);
}

#[test]
fn edge_handle_keeps_previous_graph_on_invalid_update() {
    let eldest = DeviceKey::eldest(sig(), "root", DeviceType::Desktop, 1);
    let handle = KeyFamilyHandle::new(build(vec![eldest.clone()], vec![]).unwrap());

    let twin = DeviceKey::sibkey(sig(), "root", DeviceType::Desktop, &eldest.kid, 2);
    let err = handle.replace(vec![eldest.clone(), twin], vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateDevice);
    assert_eq!(handle.current().len(), 1);

    let phone = DeviceKey::sibkey(sig(), "phone", DeviceType::Mobile, &eldest.kid, 2);
    handle.replace(vec![eldest, phone], vec![]).unwrap();
    assert_eq!(handle.current().len(), 2);
}

#[test]
fn edge_non_ascii_kids_are_rejected_not_panicking() {
    // Right length and framing, but a multibyte character in the tag.
    let odd = Kid::new(format!("01\u{20ac}{}0a", "a".repeat(63)));
    let graph = build(
        vec![DeviceKey::eldest(odd, "root", DeviceType::Desktop, 1)],
        vec![],
    )
    .expect("kids are opaque to structural validation");
    let err = graph.active_signing_key(5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoVerifiableKey);

    // Error path that abbreviates the kid for its message.
    let mut eldest = DeviceKey::eldest(
        Kid::new("aaaaaaaaaaaaaaa\u{20ac}"),
        "root",
        DeviceType::Desktop,
        1,
    );
    eldest.parent_id = Some(sig());
    let err = build(vec![eldest], vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKey);
    assert!(err.to_string().contains('\u{20ac}'));
}
