//! Producing signatures over envelopes.
//!
//! Signing always covers the canonical bytes of `signed`. Which mechanism
//! produced a signature is invisible to verifiers: every backend yields a
//! `(pubkey-hex, SignatureRecord)` pair through the [`Signer`] trait, and the
//! record is stored under the raw ed25519 public key.

pub mod openpgp;
pub mod repodata;

use serde::Serialize;

use crate::determinism::canonical_json::canonicalize;
use crate::errors::MetatrustResult;
use crate::keys::PrivateKey;
use crate::model::{to_payload, Envelope, Payload, SignatureRecord};

pub use openpgp::GpgSigner;

/// A signing backend.
///
/// Implementations: [`KeySigner`] (in-memory ed25519 key) and [`GpgSigner`]
/// (external OpenPGP program, e.g. a hardware token behind gpg). Backend
/// availability is a runtime condition reported as a `Signer` fault.
pub trait Signer {
    /// Lowercase hex of the raw ed25519 public key.
    fn public_key_hex(&self) -> MetatrustResult<String>;

    /// Sign `message` (canonical bytes) and return the record to store.
    fn sign_record(&self, message: &[u8]) -> MetatrustResult<SignatureRecord>;
}

/// Native ed25519 signer.
#[derive(Debug, Clone)]
pub struct KeySigner {
    key: PrivateKey,
}

impl KeySigner {
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    pub fn from_hex(private_key_hex: &str) -> MetatrustResult<Self> {
        PrivateKey::from_hex(private_key_hex).map(Self::new)
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }
}

impl Signer for KeySigner {
    fn public_key_hex(&self) -> MetatrustResult<String> {
        Ok(self.key.public_key().to_hex())
    }

    fn sign_record(&self, message: &[u8]) -> MetatrustResult<SignatureRecord> {
        Ok(SignatureRecord::ed25519(&self.key.sign(message)))
    }
}

/// Wrap a payload into an unsigned envelope.
pub fn wrap(value: Payload) -> MetatrustResult<Envelope> {
    Envelope::wrap(value)
}

/// Wrap any serializable value. Values outside the closed payload kinds
/// (byte blobs, non-string map keys, non-finite floats) are rejected with
/// `UnsupportedPayload`.
pub fn wrap_serialize<T: Serialize + ?Sized>(value: &T) -> MetatrustResult<Envelope> {
    Envelope::wrap(to_payload(value)?)
}

pub fn wrap_json(value: &serde_json::Value) -> MetatrustResult<Envelope> {
    Envelope::wrap(Payload::try_from(value)?)
}

/// Sign `env.signed` with `key`, adding or replacing that key's entry.
pub fn sign(env: &mut Envelope, key: &PrivateKey) -> MetatrustResult<()> {
    sign_with(env, &KeySigner::new(key.clone()))
}

/// Sign `env.signed` through any backend.
#[tracing::instrument(level = "debug", skip_all)]
pub fn sign_with(env: &mut Envelope, signer: &dyn Signer) -> MetatrustResult<()> {
    let bytes = env.signed_bytes()?;
    let pubkey = signer.public_key_hex()?;
    let record = signer.sign_record(&bytes)?;

    if env.put_signature(pubkey.clone(), &record) {
        tracing::debug!(%pubkey, "replaced existing signature");
    } else {
        tracing::debug!(%pubkey, openpgp = record.is_openpgp(), "added signature");
    }
    Ok(())
}

/// Canonicalize `value` and return the hex signature over it.
pub fn serialize_and_sign(value: &Payload, key: &PrivateKey) -> MetatrustResult<String> {
    let bytes = canonicalize(value)?;
    Ok(key.sign(&bytes).to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MetatrustError;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn sign_adds_entry_keyed_by_pubkey() {
        let key = PrivateKey::from_bytes(&[3u8; 32]);
        let mut env = wrap_json(&json!({"type": "key_mgr", "version": 1})).unwrap();
        sign(&mut env, &key).unwrap();

        let pk = key.public_key().to_hex();
        assert!(env.has_signature_from(&pk));
        let (_, rec) = env.signature_records().next().unwrap();
        let rec = rec.unwrap();
        let expected = serialize_and_sign(env.signed(), &key).unwrap();
        assert_eq!(rec.signature, expected);
    }

    #[test]
    fn resigning_overwrites() {
        let key = PrivateKey::from_bytes(&[3u8; 32]);
        let mut env = wrap_json(&json!({"a": 1})).unwrap();
        sign(&mut env, &key).unwrap();
        sign(&mut env, &key).unwrap();
        assert_eq!(env.signature_count(), 1);
    }

    #[test]
    fn wrap_serialize_is_strict() {
        #[derive(Serialize)]
        struct Meta {
            name: &'static str,
            size: u32,
        }
        let env = wrap_serialize(&Meta { name: "pkg", size: 10 }).unwrap();
        assert_eq!(env.signed().get("size"), Some(&Payload::Integer(10)));

        let mut bad = HashMap::new();
        bad.insert(1u8, "x");
        assert_matches!(wrap_serialize(&bad), Err(MetatrustError::UnsupportedPayload(_)));
        assert_matches!(wrap_serialize(&f64::INFINITY), Err(MetatrustError::UnsupportedPayload(_)));
    }
}
