//! Edit proposals for delegating metadata.
//!
//! Producing a new version of root or key manager metadata is a review
//! workflow: bump the version, refresh the timestamp, drop the old
//! signatures, make some changes, show the reviewer exactly what changed and
//! which keys now need to sign. This module is the pure part of that
//! workflow; the CLI drives it interactively.
//!
//! Nothing here mutates an existing envelope. Every step returns a fresh,
//! unsigned envelope built by re-wrapping an edited payload.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::{EitherOrBoth, Itertools};
use time::OffsetDateTime;

use crate::config::LimitsConfig;
use crate::determinism::normalize_hex::normalize_hex;
use crate::errors::{MetatrustError, MetatrustResult};
use crate::keys::PUBLIC_KEY_HEX_LEN;
use crate::model::metadata::{format_iso8601, metadata_type, parse_iso8601, ROOT_ROLE};
use crate::model::{Delegation, Delegations, Envelope, Payload, RootMetadata};
use crate::verify::delegation::{tally_keys, DelegationReport};
use crate::version::{next_version, read_version};

/// Fields only changed through dedicated operations.
const PROTECTED_FIELDS: [&str; 2] = ["type", "delegations"];

/// One change to the signed part of delegating metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    SetThreshold { role: String, threshold: u64 },
    AddDelegation { role: String, delegation: Delegation },
    RemoveDelegation { role: String },
    AddKey { role: String, pubkey: String },
    RemoveKey { role: String, pubkey: String },
    /// Set any top-level field other than `type` and `delegations`.
    SetField { field: String, value: Payload },
    RemoveField { field: String },
}

/// Start the next version of `original`: version + 1, timestamp set to
/// `now` (expiration moved by the same amount), signatures removed.
///
/// Fields that are absent stay absent.
pub fn start_new_version(original: &Envelope, now: OffsetDateTime) -> MetatrustResult<Envelope> {
    let mut signed = original
        .signed()
        .as_object()
        .ok_or_else(|| MetatrustError::format("signed metadata must be an object"))?
        .clone();

    if signed.contains_key("version") {
        let v = next_version(read_version(original.signed())?)?;
        signed.insert("version".to_string(), Payload::Integer(v));
    }

    let old_ts = match signed.get("timestamp") {
        Some(Payload::String(s)) => Some(parse_iso8601(s)?),
        Some(other) => {
            return Err(MetatrustError::format(format!(
                "\"timestamp\" must be a string, found {}",
                other.kind_name()
            )))
        }
        None => None,
    };

    if let Some(old_ts) = old_ts {
        signed.insert("timestamp".to_string(), Payload::String(format_iso8601(now)?));

        if let Some(Payload::String(exp)) = signed.get("expiration") {
            let lifetime = parse_iso8601(exp)? - old_ts;
            let new_exp = now
                .checked_add(lifetime)
                .ok_or_else(|| MetatrustError::format("expiration out of range"))?;
            signed.insert("expiration".to_string(), Payload::String(format_iso8601(new_exp)?));
        }
    }

    Envelope::wrap(Payload::Object(signed))
}

fn delegations_of(signed: &BTreeMap<String, Payload>) -> MetatrustResult<Delegations> {
    match signed.get("delegations") {
        Some(d) => Delegations::from_payload(d),
        None => Ok(Delegations::new()),
    }
}

fn role_mut<'a>(d: &'a mut Delegations, role: &str) -> MetatrustResult<&'a mut Delegation> {
    d.get_mut(role)
        .ok_or_else(|| MetatrustError::unknown_delegation(role))
}

/// Apply one operation to a signed payload, returning the edited copy.
pub fn apply_edit(signed: &Payload, op: &EditOp) -> MetatrustResult<Payload> {
    let mut obj = signed
        .as_object()
        .ok_or_else(|| MetatrustError::format("signed metadata must be an object"))?
        .clone();

    match op {
        EditOp::SetField { field, .. } | EditOp::RemoveField { field }
            if PROTECTED_FIELDS.contains(&field.as_str()) =>
        {
            return Err(MetatrustError::format(format!(
                "field \"{field}\" cannot be edited directly"
            )));
        }
        EditOp::SetField { field, value } => {
            value.check()?;
            obj.insert(field.clone(), value.clone());
            return Ok(Payload::Object(obj));
        }
        EditOp::RemoveField { field } => {
            if obj.remove(field).is_none() {
                return Err(MetatrustError::format(format!("no field \"{field}\" to remove")));
            }
            return Ok(Payload::Object(obj));
        }
        _ => {}
    }

    let mut delegations = delegations_of(&obj)?;
    match op {
        EditOp::SetThreshold { role, threshold } => {
            role_mut(&mut delegations, role)?.set_threshold(*threshold)?;
        }
        EditOp::AddDelegation { role, delegation } => {
            if delegations.get(role).is_some() {
                return Err(MetatrustError::format(format!(
                    "delegation \"{role}\" already exists"
                )));
            }
            delegations.insert(role.clone(), delegation.clone());
        }
        EditOp::RemoveDelegation { role } => {
            if delegations.remove(role).is_none() {
                return Err(MetatrustError::unknown_delegation(role.as_str()));
            }
        }
        EditOp::AddKey { role, pubkey } => {
            if !role_mut(&mut delegations, role)?.add_key(pubkey)? {
                return Err(MetatrustError::format(format!(
                    "key is already delegated for \"{role}\""
                )));
            }
        }
        EditOp::RemoveKey { role, pubkey } => {
            if !role_mut(&mut delegations, role)?.remove_key(pubkey)? {
                return Err(MetatrustError::format(format!(
                    "key is not delegated for \"{role}\""
                )));
            }
        }
        EditOp::SetField { .. } | EditOp::RemoveField { .. } => {}
    }

    obj.insert("delegations".to_string(), delegations.to_payload());
    Ok(Payload::Object(obj))
}

/// One difference between two payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added { path: String, value: Payload },
    Removed { path: String, value: Payload },
    Modified { path: String, from: Payload, to: Payload },
}

impl Change {
    pub fn path(&self) -> &str {
        match self {
            Change::Added { path, .. } | Change::Removed { path, .. } | Change::Modified { path, .. } => path,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: &Payload| p.to_json().map(|v| v.to_string()).unwrap_or_else(|_| format!("{p:?}"));
        match self {
            Change::Added { path, value } => write!(f, "+ {path}: {}", show(value)),
            Change::Removed { path, value } => write!(f, "- {path}: {}", show(value)),
            Change::Modified { path, from, to } => {
                write!(f, "~ {path}: {} -> {}", show(from), show(to))
            }
        }
    }
}

/// Structured difference between two payloads. Objects are compared member
/// by member (paths joined with `.`); anything else is compared as a whole.
pub fn diff(before: &Payload, after: &Payload) -> Vec<Change> {
    let mut out = Vec::new();
    diff_into(&mut out, "", before, after);
    out
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn diff_into(out: &mut Vec<Change>, path: &str, before: &Payload, after: &Payload) {
    match (before, after) {
        (Payload::Object(a), Payload::Object(b)) => {
            for pair in a.iter().merge_join_by(b.iter(), |x, y| x.0.cmp(y.0)) {
                match pair {
                    EitherOrBoth::Both((k, x), (_, y)) => diff_into(out, &join(path, k), x, y),
                    EitherOrBoth::Left((k, x)) => out.push(Change::Removed {
                        path: join(path, k),
                        value: x.clone(),
                    }),
                    EitherOrBoth::Right((k, y)) => out.push(Change::Added {
                        path: join(path, k),
                        value: y.clone(),
                    }),
                }
            }
        }
        (a, b) if a != b => out.push(Change::Modified {
            path: path.to_string(),
            from: a.clone(),
            to: b.clone(),
        }),
        _ => {}
    }
}

/// Where a sign-off requirement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignoffSource {
    /// Root keys of the version being replaced (continuity).
    TrustedRoot,
    /// Root keys named by the new version itself (self-consistency).
    NewRoot,
    /// Keys that signed the version being replaced.
    PreviousSigners,
}

impl SignoffSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrustedRoot => "current root keys",
            Self::NewRoot => "new root keys",
            Self::PreviousSigners => "previous signers",
        }
    }
}

/// A set of keys of which `threshold` must sign the proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignoffRequirement {
    pub source: SignoffSource,
    pub pubkeys: BTreeSet<String>,
    pub threshold: u64,
}

impl SignoffRequirement {
    /// Tally `env`'s signatures against this requirement.
    pub fn status(&self, env: &Envelope, limits: &LimitsConfig) -> MetatrustResult<DelegationReport> {
        tally_keys(self.source.as_str(), &self.pubkeys, self.threshold, env, limits)
    }
}

/// Which keys must sign `proposed`, a new version of `original`.
///
/// For root, both the current and the new root delegations apply. For any
/// other metadata, the keys that signed `original` are listed (all of them;
/// the authoritative threshold lives in root and is checked on verification).
pub fn required_signoffs(
    original: &Envelope,
    proposed: &Envelope,
) -> MetatrustResult<Vec<SignoffRequirement>> {
    if metadata_type(proposed.signed())? == ROOT_ROLE {
        let old = RootMetadata::from_envelope(original)?;
        let new = RootMetadata::from_envelope(proposed)?;
        let mut out = Vec::new();
        for (source, meta) in [(SignoffSource::TrustedRoot, &old), (SignoffSource::NewRoot, &new)] {
            if let Some(d) = meta.root_delegation() {
                out.push(SignoffRequirement {
                    source,
                    pubkeys: d.pubkeys().clone(),
                    threshold: d.threshold(),
                });
            }
        }
        return Ok(out);
    }

    let pubkeys: BTreeSet<String> = original
        .raw_signatures()
        .keys()
        .filter_map(|k| normalize_hex(k, PUBLIC_KEY_HEX_LEN, "public key").ok())
        .collect();
    let threshold = pubkeys.len() as u64;
    Ok(vec![SignoffRequirement {
        source: SignoffSource::PreviousSigners,
        pubkeys,
        threshold,
    }])
}

/// A reviewed, unsigned next version.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub envelope: Envelope,
    pub changes: Vec<Change>,
    pub required: Vec<SignoffRequirement>,
}

/// Start a new version of `original`, apply `ops` in order, and report the
/// resulting changes and required sign-offs.
pub fn propose(original: &Envelope, ops: &[EditOp], now: OffsetDateTime) -> MetatrustResult<Proposal> {
    let started = start_new_version(original, now)?;
    let signed = ops
        .iter()
        .try_fold(started.signed().clone(), |acc, op| apply_edit(&acc, op))?;
    let envelope = Envelope::wrap(signed)?;

    let changes = diff(original.signed(), envelope.signed());
    let required = required_signoffs(original, &envelope)?;
    tracing::debug!(changes = changes.len(), "built edit proposal");

    Ok(Proposal {
        envelope,
        changes,
        required,
    })
}
