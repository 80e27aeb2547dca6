//! Threshold verification of delegated metadata.
//!
//! Authority is data: the keys allowed to sign role `R`, and how many must,
//! come from `trusted.signed.delegations[R]`, never from the untrusted file.
//!
//! Order of checks:
//! 1. look up the delegation (`UnknownDelegation` / `Format`)
//! 2. the untrusted metadata's `type` must be the role (`RoleMismatch`)
//! 3. canonicalize the untrusted `signed` payload
//! 4. tally distinct delegated keys whose signature verifies
//! 5. reject below threshold (`InsufficientSignatures`)
//!
//! Individual bad entries (unparseable key, key not delegated, malformed
//! record, invalid signature) are skipped with a finding; they only matter
//! through the final count.

use std::collections::BTreeSet;

use crate::config::LimitsConfig;
use crate::determinism::normalize_hex::normalize_hex;
use crate::errors::{MetatrustError, MetatrustResult};
use crate::keys::{PublicKey, SignatureBytes, PUBLIC_KEY_HEX_LEN};
use crate::model::metadata::delegation_for;
use crate::model::{Delegation, Envelope, SignatureRecord};
use crate::signing::openpgp::verify_openpgp;
use crate::verify::{push, VerifyFinding, VerifyLevel};

/// Outcome of tallying an envelope's signatures against a delegation.
#[derive(Debug, Clone)]
pub struct DelegationReport {
    pub role: String,
    pub threshold: u64,
    /// Normalized public keys whose signatures were counted.
    pub valid_keys: BTreeSet<String>,
    pub findings: Vec<VerifyFinding>,
}

impl DelegationReport {
    pub fn valid_count(&self) -> usize {
        self.valid_keys.len()
    }

    pub fn meets_threshold(&self) -> bool {
        self.valid_count() as u64 >= self.threshold
    }

    /// Keys of `pubkeys` that have not (validly) signed.
    pub fn missing_keys<'a>(&'a self, pubkeys: &'a BTreeSet<String>) -> impl Iterator<Item = &'a str> + 'a {
        pubkeys
            .iter()
            .filter(move |k| !self.valid_keys.contains(*k))
            .map(String::as_str)
    }

    pub fn has_warnings(&self) -> bool {
        self.findings
            .iter()
            .any(|f| matches!(f.level, VerifyLevel::Warning))
    }
}

/// Verify `untrusted` as metadata for `role`, per the delegation in `trusted`.
///
/// Canonicalizes under the default [`LimitsConfig`]; see
/// [`verify_delegation_with_limits`].
pub fn verify_delegation(
    role: &str,
    untrusted: &Envelope,
    trusted: &Envelope,
) -> MetatrustResult<DelegationReport> {
    verify_delegation_with_limits(role, untrusted, trusted, &LimitsConfig::default())
}

#[tracing::instrument(level = "debug", skip(untrusted, trusted, limits))]
pub fn verify_delegation_with_limits(
    role: &str,
    untrusted: &Envelope,
    trusted: &Envelope,
    limits: &LimitsConfig,
) -> MetatrustResult<DelegationReport> {
    let delegation = delegation_for(trusted.signed(), role)?;

    let found = untrusted.metadata_type()?;
    if found != role {
        return Err(MetatrustError::role_mismatch(role, found));
    }

    let report = tally(role, &delegation, untrusted, limits)?;
    if !report.meets_threshold() {
        tracing::warn!(
            role,
            valid = report.valid_count(),
            threshold = report.threshold,
            "not enough valid signatures"
        );
        return Err(MetatrustError::InsufficientSignatures {
            role: role.to_string(),
            valid: report.valid_count(),
            threshold: report.threshold,
        });
    }

    tracing::info!(
        role,
        valid = report.valid_count(),
        threshold = report.threshold,
        "delegation verified"
    );
    Ok(report)
}

/// Count distinct delegated keys with a valid signature over `env.signed`.
///
/// Does not enforce the threshold; see [`verify_delegation`].
pub fn tally(
    role: &str,
    delegation: &Delegation,
    env: &Envelope,
    limits: &LimitsConfig,
) -> MetatrustResult<DelegationReport> {
    tally_keys(role, delegation.pubkeys(), delegation.threshold(), env, limits)
}

/// [`tally`] against an explicit key set. `pubkeys` must be normalized hex.
pub fn tally_keys(
    role: &str,
    pubkeys: &BTreeSet<String>,
    threshold: u64,
    env: &Envelope,
    limits: &LimitsConfig,
) -> MetatrustResult<DelegationReport> {
    let bytes = env.signed_bytes_with_limits(limits)?;
    let mut valid_keys = BTreeSet::new();
    let mut findings = Vec::new();

    for (raw_key, record) in env.signature_records() {
        let key_hex = match normalize_hex(raw_key, PUBLIC_KEY_HEX_LEN, "public key") {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(key = raw_key, error = %e, "skipping signature with unparseable key");
                push(&mut findings, VerifyLevel::Warning, "signature.key.malformed", e.to_string(), Some(raw_key));
                continue;
            }
        };

        if !pubkeys.contains(&key_hex) {
            tracing::debug!(key = %key_hex, role, "skipping signature from key outside the delegation");
            push(
                &mut findings,
                VerifyLevel::Info,
                "signature.key.unauthorized",
                format!("key is not delegated for role {role}"),
                Some(&key_hex),
            );
            continue;
        }

        if valid_keys.contains(&key_hex) {
            push(
                &mut findings,
                VerifyLevel::Info,
                "signature.key.duplicate",
                "key already counted",
                Some(&key_hex),
            );
            continue;
        }

        match check_entry(&key_hex, record, &bytes) {
            Ok(true) => {
                push(&mut findings, VerifyLevel::Info, "signature.valid", "signature verified", Some(&key_hex));
                valid_keys.insert(key_hex);
            }
            Ok(false) => {
                tracing::warn!(key = %key_hex, role, "skipping invalid signature");
                push(
                    &mut findings,
                    VerifyLevel::Warning,
                    "signature.invalid",
                    "signature does not verify",
                    Some(&key_hex),
                );
            }
            Err(e) => {
                tracing::warn!(key = %key_hex, error = %e, "skipping malformed signature entry");
                push(
                    &mut findings,
                    VerifyLevel::Warning,
                    "signature.record.malformed",
                    e.to_string(),
                    Some(&key_hex),
                );
            }
        }
    }

    Ok(DelegationReport {
        role: role.to_string(),
        threshold,
        valid_keys,
        findings,
    })
}

/// Verify one entry. `Err` means the entry could not be interpreted at all.
fn check_entry(
    key_hex: &str,
    record: MetatrustResult<SignatureRecord>,
    message: &[u8],
) -> MetatrustResult<bool> {
    let record = record?.normalized()?;
    let key = PublicKey::from_hex(key_hex)?;
    let sig = SignatureBytes::from_hex(&record.signature)?;

    match &record.other_headers {
        Some(headers) => {
            let headers = hex::decode(headers)
                .map_err(|e| MetatrustError::format(format!("invalid other_headers: {e}")))?;
            Ok(verify_openpgp(&key, message, &headers, &sig))
        }
        None => Ok(key.verify(message, &sig)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;
    use crate::model::Payload;
    use crate::signing::{sign, sign_with, wrap_json, Signer};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn key(n: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[n; 32])
    }

    fn trusted_root(role: &str, keys: &[&PrivateKey], threshold: u64) -> Envelope {
        let pubkeys: Vec<String> = keys.iter().map(|k| k.public_key().to_hex()).collect();
        wrap_json(&json!({
            "type": "root",
            "version": 1,
            "delegations": {role: {"pubkeys": pubkeys, "threshold": threshold}}
        }))
        .unwrap()
    }

    fn key_mgr() -> Envelope {
        wrap_json(&json!({"type": "key_mgr", "version": 1, "delegations": {}})).unwrap()
    }

    #[test]
    fn threshold_met() {
        let (a, b) = (key(1), key(2));
        let trusted = trusted_root("key_mgr", &[&a, &b], 2);
        let mut env = key_mgr();
        sign(&mut env, &a).unwrap();
        assert_matches!(
            verify_delegation("key_mgr", &env, &trusted),
            Err(MetatrustError::InsufficientSignatures { valid: 1, threshold: 2, .. })
        );
        sign(&mut env, &b).unwrap();
        let report = verify_delegation("key_mgr", &env, &trusted).unwrap();
        assert_eq!(report.valid_count(), 2);
    }

    #[test]
    fn missing_keys_are_the_unsigned_delegates() {
        let (a, b) = (key(1), key(2));
        let trusted = trusted_root("key_mgr", &[&a, &b], 1);
        let mut env = key_mgr();
        sign(&mut env, &a).unwrap();

        let delegation = delegation_for(trusted.signed(), "key_mgr").unwrap();
        let report = verify_delegation("key_mgr", &env, &trusted).unwrap();
        let missing: Vec<&str> = report.missing_keys(delegation.pubkeys()).collect();
        let b_hex = b.public_key().to_hex();
        assert_eq!(missing, vec![b_hex.as_str()]);
    }

    #[test]
    fn caller_limits_apply_when_recanonicalizing() {
        let a = key(1);
        let trusted = trusted_root("key_mgr", &[&a], 1);
        let mut env = key_mgr();
        sign(&mut env, &a).unwrap();

        let shallow = LimitsConfig {
            max_depth: 0,
            ..LimitsConfig::default()
        };
        assert_matches!(
            verify_delegation_with_limits("key_mgr", &env, &trusted, &shallow),
            Err(MetatrustError::Format(msg)) if msg.contains("maximum depth 0")
        );
        assert!(verify_delegation_with_limits("key_mgr", &env, &trusted, &LimitsConfig::default()).is_ok());
    }

    #[test]
    fn case_variant_duplicate_counts_once() {
        let (a, b) = (key(1), key(2));
        let trusted = trusted_root("key_mgr", &[&a, &b], 2);
        let mut env = key_mgr();
        sign(&mut env, &a).unwrap();

        // Same key and signature again under an uppercased map key.
        let mut file = env.to_payload();
        let sigs = file
            .as_object_mut()
            .and_then(|m| m.get_mut("signatures"))
            .and_then(Payload::as_object_mut)
            .unwrap();
        let lower = a.public_key().to_hex();
        let entry = sigs[&lower].clone();
        sigs.insert(lower.to_uppercase(), entry);
        let env = Envelope::from_payload(file).unwrap();

        let err = verify_delegation("key_mgr", &env, &trusted).unwrap_err();
        assert_matches!(err, MetatrustError::InsufficientSignatures { valid: 1, .. });
    }

    #[test]
    fn bad_entries_are_skipped_not_fatal() {
        let a = key(1);
        let trusted = trusted_root("key_mgr", &[&a], 1);
        let mut env = key_mgr();
        sign(&mut env, &a).unwrap();

        let mut file = env.to_payload();
        let sigs = file
            .as_object_mut()
            .and_then(|m| m.get_mut("signatures"))
            .and_then(Payload::as_object_mut)
            .unwrap();
        sigs.insert("zz-not-a-key".to_string(), Payload::from("junk"));
        sigs.insert(key(7).public_key().to_hex(), Payload::try_from(json!({"signature": "00"})).unwrap());
        let env = Envelope::from_payload(file).unwrap();

        let report = verify_delegation("key_mgr", &env, &trusted).unwrap();
        assert_eq!(report.valid_count(), 1);
        assert!(report.has_warnings());
    }

    #[test]
    fn unauthorized_key_not_counted() {
        let (a, outsider) = (key(1), key(9));
        let trusted = trusted_root("key_mgr", &[&a], 1);
        let mut env = key_mgr();
        sign(&mut env, &outsider).unwrap();
        assert_matches!(
            verify_delegation("key_mgr", &env, &trusted),
            Err(MetatrustError::InsufficientSignatures { valid: 0, .. })
        );
    }

    #[test]
    fn tampering_breaks_signature() {
        let a = key(1);
        let trusted = trusted_root("key_mgr", &[&a], 1);
        let mut env = key_mgr();
        sign(&mut env, &a).unwrap();

        let mut file = env.to_payload();
        file.as_object_mut()
            .and_then(|m| m.get_mut("signed"))
            .and_then(Payload::as_object_mut)
            .unwrap()
            .insert("version".to_string(), Payload::Integer(2));
        let tampered = Envelope::from_payload(file).unwrap();
        assert!(verify_delegation("key_mgr", &tampered, &trusted).is_err());
    }

    #[test]
    fn lookup_and_role_faults_come_first() {
        let a = key(1);
        let trusted = trusted_root("key_mgr", &[&a], 1);
        let unsigned = key_mgr();
        assert_matches!(
            verify_delegation("other", &unsigned, &trusted),
            Err(MetatrustError::UnknownDelegation { .. })
        );

        let no_delegations = wrap_json(&json!({"type": "root", "version": 1})).unwrap();
        assert_matches!(
            verify_delegation("key_mgr", &unsigned, &no_delegations),
            Err(MetatrustError::UnknownDelegation { .. })
        );

        // Unsigned, but of the wrong type: reported as a mismatch, not a tally.
        let wrong = wrap_json(&json!({"type": "root", "version": 1})).unwrap();
        assert_matches!(
            verify_delegation("key_mgr", &wrong, &trusted),
            Err(MetatrustError::RoleMismatch { .. })
        );
    }

    #[test]
    fn malformed_delegation_is_format_fault() {
        let trusted = wrap_json(&json!({
            "type": "root",
            "delegations": {"key_mgr": {"pubkeys": [], "threshold": 1, "extra": true}}
        }))
        .unwrap();
        assert_matches!(
            verify_delegation("key_mgr", &key_mgr(), &trusted),
            Err(MetatrustError::Format(_))
        );
    }

    struct FakeGpg(PrivateKey);

    impl Signer for FakeGpg {
        fn public_key_hex(&self) -> MetatrustResult<String> {
            Ok(self.0.public_key().to_hex())
        }

        fn sign_record(&self, message: &[u8]) -> MetatrustResult<SignatureRecord> {
            Ok(crate::signing::openpgp::tests::openpgp_record(&self.0, message))
        }
    }

    #[test]
    fn openpgp_records_verify() {
        let a = key(1);
        let trusted = trusted_root("key_mgr", &[&a], 1);
        let mut env = key_mgr();
        sign_with(&mut env, &FakeGpg(a.clone())).unwrap();

        let (_, rec) = env.signature_records().next().unwrap();
        assert!(rec.unwrap().is_openpgp());
        verify_delegation("key_mgr", &env, &trusted).unwrap();
    }
}
