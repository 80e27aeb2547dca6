//! Per-artifact signatures in a repository index.
//!
//! The index keeps artifact metadata under `packages` (and `packages.conda`).
//! Signing adds a parallel top-level `signatures` object:
//!
//! ```text
//! "signatures": {"<artifact>": {"<pubkey-hex>": {"signature": "<hex128>"}}}
//! ```
//!
//! Each signature covers the canonical bytes of that artifact's metadata
//! object. The artifact name itself is not signed.

use std::collections::BTreeMap;

use crate::errors::{MetatrustError, MetatrustResult};
use crate::keys::{PrivateKey, PublicKey, SignatureBytes};
use crate::model::{Payload, SignatureRecord};
use crate::signing::serialize_and_sign;

pub const PACKAGES: &str = "packages";
pub const PACKAGES_CONDA: &str = "packages.conda";
pub const SIGNATURES: &str = "signatures";

fn section<'a>(repodata: &'a Payload, name: &str) -> MetatrustResult<Option<&'a BTreeMap<String, Payload>>> {
    match repodata.get(name) {
        None => Ok(None),
        Some(Payload::Object(m)) => Ok(Some(m)),
        Some(other) => Err(MetatrustError::format(format!(
            "repodata \"{name}\" must be an object, found {}",
            other.kind_name()
        ))),
    }
}

/// Sign every artifact in `packages` and `packages.conda` with `key`.
///
/// Any existing `signatures` object is replaced entirely, so the result only
/// carries signatures made here. Everything else is copied unchanged.
pub fn sign_all_in_repodata(repodata: &Payload, key: &PrivateKey) -> MetatrustResult<Payload> {
    let mut out = repodata
        .as_object()
        .ok_or_else(|| MetatrustError::format("repodata must be a JSON object"))?
        .clone();

    let packages = section(repodata, PACKAGES)?
        .ok_or_else(|| MetatrustError::format("repodata has no \"packages\" entry"))?;
    let conda = section(repodata, PACKAGES_CONDA)?;

    let pubkey = key.public_key().to_hex();
    let mut signatures = BTreeMap::new();

    for (artifact, metadata) in packages.iter().chain(conda.into_iter().flatten()) {
        let sig = serialize_and_sign(metadata, key)?;
        let record = SignatureRecord {
            signature: sig,
            other_headers: None,
            see_also: None,
        };
        let mut by_key = BTreeMap::new();
        by_key.insert(pubkey.clone(), record.to_payload());
        signatures.insert(artifact.clone(), Payload::Object(by_key));
    }

    tracing::info!(artifacts = signatures.len(), %pubkey, "signed repodata artifacts");
    out.insert(SIGNATURES.to_string(), Payload::Object(signatures));
    Ok(Payload::Object(out))
}

/// Check one artifact's signature by `key`.
///
/// Returns `Ok(false)` if the signature is missing or does not verify; a
/// malformed index or signature entry is a `Format` fault.
pub fn verify_artifact(repodata: &Payload, artifact: &str, key: &PublicKey) -> MetatrustResult<bool> {
    let metadata = [PACKAGES, PACKAGES_CONDA]
        .into_iter()
        .map(|s| section(repodata, s))
        .collect::<MetatrustResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .find_map(|m| m.get(artifact))
        .ok_or_else(|| MetatrustError::format(format!("artifact {artifact:?} is not in repodata")))?;

    let Some(entry) = section(repodata, SIGNATURES)?
        .and_then(|sigs| sigs.get(artifact))
        .and_then(|by_key| by_key.get(&key.to_hex()))
    else {
        return Ok(false);
    };

    let record = SignatureRecord::from_payload(entry)?;
    let sig = SignatureBytes::from_hex(&record.signature)?;
    let bytes = crate::determinism::canonical_json::canonicalize(metadata)?;
    Ok(key.verify(&bytes, &sig))
}
