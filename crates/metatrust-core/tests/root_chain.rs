//! root_chain.rs
//!
//! Root rotation scenarios.

use assert_matches::assert_matches;
use metatrust_core::errors::ChainCheck;
use metatrust_core::keys::PrivateKey;
use metatrust_core::model::metadata::build_root_metadata;
use metatrust_core::model::{Delegation, Envelope};
use metatrust_core::signing::{sign, wrap};
use metatrust_core::verify::{verify_delegation, verify_root, verify_root_chain};
use metatrust_core::MetatrustError;
use time::macros::datetime;

fn root(version: u64, keys: &[&PrivateKey], threshold: u64, key_mgr: Option<Delegation>) -> Envelope {
    let d = Delegation::new(keys.iter().map(|k| k.public_key().to_hex()), threshold).unwrap();
    let signed = build_root_metadata(d, key_mgr, version, Some(datetime!(2024-03-01 12:00 UTC)), None).unwrap();
    wrap(signed).unwrap()
}

#[test]
fn rotation_from_a_to_b() {
    let a = PrivateKey::from_bytes(&[0xaa; 32]);
    let b = PrivateKey::from_bytes(&[0xbb; 32]);

    let mut v1 = root(1, &[&a], 1, None);
    sign(&mut v1, &a).unwrap();

    let mut v2 = root(2, &[&b], 1, None);
    sign(&mut v2, &a).unwrap();

    // Without B's self-signature the new root is not self-consistent.
    let err = verify_root(&v1, &v2).unwrap_err();
    assert_matches!(err, MetatrustError::ChainVerification { check: ChainCheck::SelfConsistency, .. });

    sign(&mut v2, &b).unwrap();
    let report = verify_root(&v1, &v2).unwrap();
    assert_eq!((report.trusted_version, report.version), (1, 2));
}

#[test]
fn skipped_version_is_rejected() {
    let a = PrivateKey::from_bytes(&[0xaa; 32]);
    let b = PrivateKey::from_bytes(&[0xbb; 32]);
    let v1 = root(1, &[&a], 1, None);

    let mut v3 = root(3, &[&b], 1, None);
    sign(&mut v3, &a).unwrap();
    sign(&mut v3, &b).unwrap();
    let err = verify_root(&v1, &v3).unwrap_err();
    assert_matches!(err, MetatrustError::VersionMismatch { trusted: 1, expected: 2, found: 3 });
    assert_eq!(err.code(), "version.mismatch");
}

#[test]
fn replaying_the_trusted_root_is_rejected() {
    let a = PrivateKey::from_bytes(&[0xaa; 32]);
    let mut v1 = root(1, &[&a], 1, None);
    sign(&mut v1, &a).unwrap();
    assert_matches!(verify_root(&v1, &v1), Err(MetatrustError::VersionMismatch { .. }));
}

#[test]
fn non_root_candidate_is_role_mismatch() {
    let a = PrivateKey::from_bytes(&[0xaa; 32]);
    let v1 = root(1, &[&a], 1, None);
    let km = metatrust_core::signing::wrap_json(&serde_json::json!({"type": "key_mgr", "version": 2})).unwrap();
    assert_matches!(verify_root(&v1, &km), Err(MetatrustError::RoleMismatch { .. }));
}

#[test]
fn two_of_three_rotation_and_key_mgr_delegation() {
    let ks: Vec<PrivateKey> = (1..=4u8).map(|n| PrivateKey::from_bytes(&[n; 32])).collect();
    let km_key = PrivateKey::from_bytes(&[0x42; 32]);
    let km_delegation = Delegation::new([km_key.public_key().to_hex()], 1).unwrap();

    let v1 = root(1, &[&ks[0], &ks[1], &ks[2]], 2, Some(km_delegation.clone()));
    let mut v2 = root(2, &[&ks[1], &ks[2], &ks[3]], 2, Some(km_delegation));
    // ks[1] and ks[2] are in both sets, so two signatures satisfy both checks.
    sign(&mut v2, &ks[1]).unwrap();
    sign(&mut v2, &ks[2]).unwrap();

    let chain = verify_root_chain(&v1, &[v2.clone()]).unwrap();
    assert_eq!(chain.latest_version(), Some(2));

    let mut km = metatrust_core::signing::wrap_json(&serde_json::json!({
        "type": "key_mgr",
        "version": 1,
        "delegations": {}
    }))
    .unwrap();
    sign(&mut km, &km_key).unwrap();
    verify_delegation("key_mgr", &km, &v2).unwrap();
}
