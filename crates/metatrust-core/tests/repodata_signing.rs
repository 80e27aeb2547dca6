//! repodata_signing.rs
//!
//! End-to-end signing of a repository index.

use metatrust_core::determinism::canonical_json::canonicalize_json;
use metatrust_core::keys::{PrivateKey, SignatureBytes};
use metatrust_core::model::Payload;
use metatrust_core::parse::parse_payload_bytes;
use metatrust_core::signing::repodata::{sign_all_in_repodata, verify_artifact};
use serde_json::json;

#[test]
fn single_artifact_index() {
    let key = PrivateKey::from_hex("c9888f4c0b8c4ca4a5e6e8a6b8c9a1d3a5b7c9e1f3a5b7c9d1e3f5a7b9c1d3e5").unwrap();
    let pubkey = key.public_key().to_hex();
    let index = Payload::try_from(json!({
        "info": {"subdir": "noarch"},
        "packages": {},
        "packages.conda": {"foo-1.0-0.conda": {"name": "foo"}}
    })).unwrap();

    let signed = sign_all_in_repodata(&index, &key).unwrap();
    let hexsig = signed
        .get("signatures")
        .and_then(|s| s.get("foo-1.0-0.conda"))
        .and_then(|s| s.get(&pubkey))
        .and_then(|s| s.get("signature"))
        .and_then(Payload::as_str)
        .unwrap();

    assert_eq!(hexsig.len(), 128);
    assert!(hexsig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let expected = canonicalize_json(&json!({"name": "foo"})).unwrap();
    let sig = SignatureBytes::from_hex(hexsig).unwrap();
    assert!(key.public_key().verify(&expected, &sig));
}

#[test]
fn signed_index_survives_a_write_and_reload() {
    let key = PrivateKey::from_bytes(&[0x5a; 32]);
    let index = Payload::try_from(json!({
        "packages": {
            "bar-2.1-py_0.tar.bz2": {"name": "bar", "version": "2.1", "depends": ["python >=3.8"], "size": 1234},
            "baz-0.1-0.tar.bz2": {"name": "baz", "md5": "d41d8cd98f00b204e9800998ecf8427e"}
        }
    })).unwrap();
    let signed = sign_all_in_repodata(&index, &key).unwrap();

    let bytes = metatrust_core::determinism::canonical_json::canonicalize(&signed).unwrap();
    let reloaded = parse_payload_bytes(&bytes, &Default::default()).unwrap();
    for artifact in ["bar-2.1-py_0.tar.bz2", "baz-0.1-0.tar.bz2"] {
        assert!(verify_artifact(&reloaded, artifact, &key.public_key()).unwrap());
    }
}
