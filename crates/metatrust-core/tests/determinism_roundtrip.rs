//! determinism_roundtrip.rs
//!
//! Property tests for the canonical codec and signing:
//! - same logical value => same bytes, whatever the construction order
//! - canonical bytes parse back to a value with the same canonical bytes
//! - wrap + sign verifies against the canonical bytes
//! - any single flipped byte breaks the signature

use std::collections::{BTreeMap, HashMap};

use metatrust_core::determinism::canonical_json::canonicalize;
use metatrust_core::keys::{PrivateKey, SignatureBytes};
use metatrust_core::model::{to_payload, Payload};
use metatrust_core::parse::parse_envelope_bytes;
use metatrust_core::signing::{serialize_and_sign, sign, wrap};
use proptest::prelude::*;

fn payload_strategy() -> impl Strategy<Value = Payload> {
    let leaf = prop_oneof![
        Just(Payload::Null),
        any::<bool>().prop_map(Payload::Bool),
        any::<i128>().prop_map(Payload::Integer),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Payload::Float),
        "\\PC{0,12}".prop_map(Payload::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Payload::List),
            prop::collection::btree_map("[a-zA-Z0-9_.\u{e9}]{0,8}", inner, 0..6)
                .prop_map(Payload::Object),
        ]
    })
}

#[test]
fn wide_integer_signature_survives_reload() {
    let key = PrivateKey::from_bytes(&[0x70; 32]);
    let mut env = wrap(to_payload(&BTreeMap::from([("n", 1u128 << 70)])).unwrap()).unwrap();
    sign(&mut env, &key).unwrap();

    let bytes = env.to_canonical_bytes().unwrap();
    let reloaded = parse_envelope_bytes(&bytes, &Default::default()).unwrap();
    assert_eq!(reloaded.signed().get("n"), Some(&Payload::Integer(1 << 70)));
    assert_eq!(reloaded.to_canonical_bytes().unwrap(), bytes);

    let (_, rec) = reloaded.signature_records().next().unwrap();
    let sig = SignatureBytes::from_hex(&rec.unwrap().signature).unwrap();
    assert!(key.public_key().verify(&reloaded.signed_bytes().unwrap(), &sig));
}

proptest! {
    #[test]
    fn construction_order_does_not_matter(entries in prop::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..16)) {
        let hashed: HashMap<String, i64> = entries.iter().cloned().collect();
        let ordered: BTreeMap<String, i64> = entries.iter().cloned().collect();
        let mut reversed = serde_json::Map::new();
        for (k, v) in ordered.iter().rev() {
            reversed.insert(k.clone(), serde_json::Value::from(*v));
        }

        let a = canonicalize(&to_payload(&hashed).unwrap()).unwrap();
        let b = canonicalize(&to_payload(&ordered).unwrap()).unwrap();
        let c = canonicalize(&Payload::try_from(serde_json::Value::Object(reversed)).unwrap()).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &c);
    }

    #[test]
    fn canonical_bytes_reparse_to_same_bytes(v in payload_strategy()) {
        let bytes = canonicalize(&v).unwrap();
        prop_assert!(bytes.is_ascii());
        let back: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(canonicalize(&Payload::try_from(back).unwrap()).unwrap(), bytes);
    }

    #[test]
    fn signed_envelopes_verify(v in payload_strategy(), seed in any::<[u8; 32]>()) {
        let key = PrivateKey::from_bytes(&seed);
        let mut env = wrap(v.clone()).unwrap();
        sign(&mut env, &key).unwrap();

        let pk = key.public_key();
        let (_, rec) = env.signature_records().next().unwrap();
        let sig = SignatureBytes::from_hex(&rec.unwrap().signature).unwrap();
        prop_assert!(pk.verify(&canonicalize(&v).unwrap(), &sig));
    }

    #[test]
    fn flipped_byte_fails(v in payload_strategy(), seed in any::<[u8; 32]>(), pos in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let key = PrivateKey::from_bytes(&seed);
        let sig = SignatureBytes::from_hex(&serialize_and_sign(&v, &key).unwrap()).unwrap();

        let mut bytes = canonicalize(&v).unwrap();
        let i = pos.index(bytes.len());
        bytes[i] ^= mask;
        prop_assert!(!key.public_key().verify(&bytes, &sig));
    }
}
