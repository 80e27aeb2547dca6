//! Signable envelopes.
//!
//! ```text
//! {"signatures": {"<pubkey-hex>": {"signature": "<hex128>", ...}}, "signed": {...}}
//! ```
//!
//! `signatures` is a map keyed by public key, so one key can contribute at
//! most one entry. Signature entries are kept exactly as loaded; they are
//! decoded into [`SignatureRecord`]s lazily, which lets a verifier skip a
//! single malformed entry and lets an envelope re-serialize byte-identically.

use std::collections::BTreeMap;

use crate::config::LimitsConfig;
use crate::determinism::canonical_json::{canonicalize, canonicalize_with_limits};
use crate::determinism::normalize_hex::{normalize_hex, normalize_hex_any};
use crate::errors::{MetatrustError, MetatrustResult};
use crate::keys::{SignatureBytes, FINGERPRINT_HEX_LEN, SIGNATURE_HEX_LEN};
use crate::model::Payload;

const SIGNATURES: &str = "signatures";
const SIGNED: &str = "signed";

/// One signature entry.
///
/// `other_headers` and `see_also` only appear on OpenPGP-produced records:
/// `other_headers` holds the hashed OpenPGP header fields the signature also
/// covers, `see_also` the signing key's fingerprint (informational).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    pub signature: String,
    pub other_headers: Option<String>,
    pub see_also: Option<String>,
}

impl SignatureRecord {
    /// A plain ed25519 record.
    pub fn ed25519(signature: &SignatureBytes) -> Self {
        Self {
            signature: signature.to_hex(),
            other_headers: None,
            see_also: None,
        }
    }

    pub fn is_openpgp(&self) -> bool {
        self.other_headers.is_some()
    }

    /// Validate hex fields and return the normalized record.
    pub fn normalized(&self) -> MetatrustResult<Self> {
        Ok(Self {
            signature: normalize_hex(&self.signature, SIGNATURE_HEX_LEN, "signature")?,
            other_headers: self
                .other_headers
                .as_deref()
                .map(|h| normalize_hex_any(h, "other_headers"))
                .transpose()?,
            see_also: self
                .see_also
                .as_deref()
                .map(|f| normalize_hex(f, FINGERPRINT_HEX_LEN, "see_also fingerprint"))
                .transpose()?,
        })
    }

    pub fn from_payload(p: &Payload) -> MetatrustResult<Self> {
        let obj = p.as_object().ok_or_else(|| {
            MetatrustError::format(format!(
                "signature record must be an object, found {}",
                p.kind_name()
            ))
        })?;

        let field = |name: &str| -> MetatrustResult<Option<String>> {
            match obj.get(name) {
                None => Ok(None),
                Some(Payload::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(MetatrustError::format(format!(
                    "signature record field \"{name}\" must be a string, found {}",
                    other.kind_name()
                ))),
            }
        };

        let signature = field("signature")?
            .ok_or_else(|| MetatrustError::format("signature record is missing \"signature\""))?;

        Ok(Self {
            signature,
            other_headers: field("other_headers")?,
            see_also: field("see_also")?,
        })
    }

    pub fn to_payload(&self) -> Payload {
        let mut m = BTreeMap::new();
        m.insert("signature".to_string(), Payload::from(self.signature.as_str()));
        if let Some(h) = &self.other_headers {
            m.insert("other_headers".to_string(), Payload::from(h.as_str()));
        }
        if let Some(f) = &self.see_also {
            m.insert("see_also".to_string(), Payload::from(f.as_str()));
        }
        Payload::Object(m)
    }
}

/// A payload paired with signatures over its canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    signatures: BTreeMap<String, Payload>,
    signed: Payload,
}

impl Envelope {
    /// Wrap a payload with an empty signature map.
    ///
    /// The payload is moved in, so the envelope owns an independent copy.
    pub fn wrap(signed: Payload) -> MetatrustResult<Self> {
        signed.check()?;
        Ok(Self {
            signatures: BTreeMap::new(),
            signed,
        })
    }

    pub fn signed(&self) -> &Payload {
        &self.signed
    }

    /// Raw signature entries, as loaded.
    pub fn raw_signatures(&self) -> &BTreeMap<String, Payload> {
        &self.signatures
    }

    /// Signature entries decoded into records. Entries that do not decode
    /// carry their error instead of aborting the iteration.
    pub fn signature_records(
        &self,
    ) -> impl Iterator<Item = (&str, MetatrustResult<SignatureRecord>)> + '_ {
        self.signatures
            .iter()
            .map(|(k, v)| (k.as_str(), SignatureRecord::from_payload(v)))
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn has_signature_from(&self, pubkey_hex: &str) -> bool {
        self.signatures.contains_key(pubkey_hex)
    }

    /// Insert or overwrite the entry for `pubkey_hex`. Returns true if an
    /// entry was replaced.
    pub(crate) fn put_signature(&mut self, pubkey_hex: String, record: &SignatureRecord) -> bool {
        self.signatures
            .insert(pubkey_hex, record.to_payload())
            .is_some()
    }

    /// Remove the entry for `pubkey_hex`, if present.
    pub fn remove_signature(&mut self, pubkey_hex: &str) -> bool {
        self.signatures.remove(pubkey_hex).is_some()
    }

    /// A copy of this envelope with no signatures.
    pub fn unsigned(&self) -> Self {
        Self {
            signatures: BTreeMap::new(),
            signed: self.signed.clone(),
        }
    }

    /// The `type` field of the signed payload.
    pub fn metadata_type(&self) -> MetatrustResult<&str> {
        crate::model::metadata::metadata_type(&self.signed)
    }

    /// Canonical bytes of the signed payload (what signatures cover).
    pub fn signed_bytes(&self) -> MetatrustResult<Vec<u8>> {
        canonicalize(&self.signed)
    }

    /// [`Envelope::signed_bytes`] under caller-supplied limits.
    pub fn signed_bytes_with_limits(&self, limits: &LimitsConfig) -> MetatrustResult<Vec<u8>> {
        canonicalize_with_limits(&self.signed, limits)
    }

    pub fn from_payload(p: Payload) -> MetatrustResult<Self> {
        let Payload::Object(mut members) = p else {
            return Err(MetatrustError::format("envelope must be a JSON object"));
        };

        if let Some(extra) = members.keys().find(|k| *k != SIGNATURES && *k != SIGNED) {
            return Err(MetatrustError::format(format!(
                "unexpected top-level field \"{extra}\" in envelope"
            )));
        }

        let signed = members
            .remove(SIGNED)
            .ok_or_else(|| MetatrustError::format("envelope is missing \"signed\""))?;
        let signatures = match members.remove(SIGNATURES) {
            Some(Payload::Object(m)) => m,
            Some(other) => {
                return Err(MetatrustError::format(format!(
                    "envelope \"signatures\" must be an object, found {}",
                    other.kind_name()
                )))
            }
            None => return Err(MetatrustError::format("envelope is missing \"signatures\"")),
        };

        signed.check()?;
        Ok(Self { signatures, signed })
    }

    pub fn from_json(v: &serde_json::Value) -> MetatrustResult<Self> {
        Self::from_payload(Payload::try_from(v)?)
    }

    pub fn to_payload(&self) -> Payload {
        let mut m = BTreeMap::new();
        m.insert(
            SIGNATURES.to_string(),
            Payload::Object(self.signatures.clone()),
        );
        m.insert(SIGNED.to_string(), self.signed.clone());
        Payload::Object(m)
    }

    /// The whole envelope in canonical form, as written to disk.
    pub fn to_canonical_bytes(&self) -> MetatrustResult<Vec<u8>> {
        canonicalize(&self.to_payload())
    }

    pub fn to_canonical_bytes_with_limits(&self, limits: &LimitsConfig) -> MetatrustResult<Vec<u8>> {
        canonicalize_with_limits(&self.to_payload(), limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn wrap_starts_unsigned() {
        let env = Envelope::wrap(Payload::try_from(json!({"type": "key_mgr"})).unwrap()).unwrap();
        assert_eq!(env.signature_count(), 0);
        assert_eq!(env.metadata_type().unwrap(), "key_mgr");
    }

    #[test]
    fn reserialization_is_byte_identical() {
        let file = json!({
            "signatures": {
                "ab": {"signature": "00", "other_headers": "04", "extra": 1},
                "cd": "not even an object"
            },
            "signed": {"type": "root", "version": 1}
        });
        let env = Envelope::from_json(&file).unwrap();
        let bytes = env.to_canonical_bytes().unwrap();
        let again = Envelope::from_payload(
            Payload::try_from(serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(again.to_canonical_bytes().unwrap(), bytes);
    }

    #[test]
    fn malformed_records_are_reported_lazily() {
        let env = Envelope::from_json(&json!({
            "signatures": {"cd": 5, "ef": {"signature": "aa"}},
            "signed": {}
        }))
        .unwrap();
        let recs: Vec<_> = env.signature_records().collect();
        assert!(recs[0].1.is_err());
        assert!(recs[1].1.is_ok());
    }

    #[test]
    fn shape_faults() {
        assert_matches!(
            Envelope::from_json(&json!({"signed": {}})),
            Err(MetatrustError::Format(_))
        );
        assert_matches!(
            Envelope::from_json(&json!({"signed": {}, "signatures": []})),
            Err(MetatrustError::Format(_))
        );
        assert_matches!(
            Envelope::from_json(&json!({"signed": {}, "signatures": {}, "x": 1})),
            Err(MetatrustError::Format(_))
        );
    }

    #[test]
    fn record_normalization() {
        let rec = SignatureRecord {
            signature: "AB".repeat(64),
            other_headers: Some("04 00".to_string()),
            see_also: None,
        };
        let n = rec.normalized().unwrap();
        assert_eq!(n.signature, "ab".repeat(64));
        assert_eq!(n.other_headers.as_deref(), Some("0400"));
        assert!(n.is_openpgp());
    }
}
