//! Typed views over signed metadata payloads.
//!
//! Delegating metadata (root, key manager) carries a `delegations` object that
//! names, per role, which public keys may sign that role's metadata and how
//! many of them must:
//!
//! ```text
//! "delegations": {
//!   "root":    {"pubkeys": ["<hex64>", ...], "threshold": 2},
//!   "key_mgr": {"pubkeys": ["<hex64>"], "threshold": 1}
//! }
//! ```
//!
//! Parsing here is strict: unknown fields in a delegation record are rejected
//! and public keys are normalized to lowercase hex on the way in, so key
//! comparison later is plain string equality.

use std::collections::{BTreeMap, BTreeSet};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::determinism::normalize_hex::normalize_hex;
use crate::errors::{MetatrustError, MetatrustResult};
use crate::keys::PUBLIC_KEY_HEX_LEN;
use crate::model::envelope::Envelope;
use crate::model::Payload;
use crate::version::read_version;

/// Version of the metadata layout produced by the builders in this module.
pub const METADATA_SPEC_VERSION: &str = "0.6.0";

/// Role name of root metadata.
pub const ROOT_ROLE: &str = "root";

/// Role name of key manager metadata.
pub const KEY_MGR_ROLE: &str = "key_mgr";

/// Default lifetime of newly built metadata.
pub const DEFAULT_EXPIRY: Duration = Duration::days(365);

const ISO8601: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// Format `base + delta` as `YYYY-MM-DDTHH:MM:SSZ` in UTC.
pub fn iso8601_time_plus_delta(base: OffsetDateTime, delta: Duration) -> MetatrustResult<String> {
    let t = base
        .checked_add(delta)
        .ok_or_else(|| MetatrustError::format("timestamp out of range"))?;
    format_iso8601(t)
}

pub fn format_iso8601(t: OffsetDateTime) -> MetatrustResult<String> {
    t.to_offset(UtcOffset::UTC)
        .format(ISO8601)
        .map_err(|e| MetatrustError::format(format!("cannot format timestamp: {e}")))
}

pub fn parse_iso8601(s: &str) -> MetatrustResult<OffsetDateTime> {
    PrimitiveDateTime::parse(s, ISO8601)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| MetatrustError::format(format!("invalid timestamp {s:?}: {e}")))
}

/// The `type` field of a signed payload.
pub fn metadata_type(signed: &Payload) -> MetatrustResult<&str> {
    let obj = signed.as_object().ok_or_else(|| {
        MetatrustError::format(format!(
            "signed metadata must be an object, found {}",
            signed.kind_name()
        ))
    })?;
    match obj.get("type") {
        Some(Payload::String(s)) => Ok(s),
        Some(other) => Err(MetatrustError::format(format!(
            "metadata \"type\" must be a string, found {}",
            other.kind_name()
        ))),
        None => Err(MetatrustError::format("metadata is missing \"type\"")),
    }
}

/// Which keys may sign a role, and how many must.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pubkeys: BTreeSet<String>,
    threshold: u64,
}

impl Delegation {
    /// Build a delegation from hex public keys.
    ///
    /// Unlike [`Delegation::from_payload`], this refuses a threshold that no
    /// set of the listed keys could meet.
    pub fn new<I, S>(pubkeys: I, threshold: u64) -> MetatrustResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pubkeys = pubkeys
            .into_iter()
            .map(|k| normalize_hex(k.as_ref(), PUBLIC_KEY_HEX_LEN, "delegated public key"))
            .collect::<MetatrustResult<BTreeSet<_>>>()?;
        if threshold < 1 {
            return Err(MetatrustError::format("delegation threshold must be at least 1"));
        }
        if threshold > pubkeys.len() as u64 {
            return Err(MetatrustError::format(format!(
                "delegation threshold {threshold} exceeds the {} listed key(s)",
                pubkeys.len()
            )));
        }
        Ok(Self { pubkeys, threshold })
    }

    pub fn pubkeys(&self) -> &BTreeSet<String> {
        &self.pubkeys
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn contains(&self, pubkey_hex: &str) -> bool {
        self.pubkeys.contains(pubkey_hex)
    }

    pub fn set_threshold(&mut self, threshold: u64) -> MetatrustResult<()> {
        if threshold < 1 {
            return Err(MetatrustError::format("delegation threshold must be at least 1"));
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Add a key. Returns false if it was already listed.
    pub fn add_key(&mut self, pubkey_hex: &str) -> MetatrustResult<bool> {
        let k = normalize_hex(pubkey_hex, PUBLIC_KEY_HEX_LEN, "delegated public key")?;
        Ok(self.pubkeys.insert(k))
    }

    /// Remove a key. Returns false if it was not listed.
    pub fn remove_key(&mut self, pubkey_hex: &str) -> MetatrustResult<bool> {
        let k = normalize_hex(pubkey_hex, PUBLIC_KEY_HEX_LEN, "delegated public key")?;
        Ok(self.pubkeys.remove(&k))
    }

    pub fn from_payload(p: &Payload) -> MetatrustResult<Self> {
        let obj = p.as_object().ok_or_else(|| {
            MetatrustError::format(format!(
                "delegation must be an object, found {}",
                p.kind_name()
            ))
        })?;

        if let Some(extra) = obj.keys().find(|k| *k != "pubkeys" && *k != "threshold") {
            return Err(MetatrustError::format(format!(
                "unexpected field \"{extra}\" in delegation"
            )));
        }

        let keys = obj
            .get("pubkeys")
            .ok_or_else(|| MetatrustError::format("delegation is missing \"pubkeys\""))?
            .as_list()
            .ok_or_else(|| MetatrustError::format("delegation \"pubkeys\" must be a list"))?;
        let pubkeys = keys
            .iter()
            .map(|k| {
                let s = k.as_str().ok_or_else(|| {
                    MetatrustError::format(format!(
                        "delegated public key must be a string, found {}",
                        k.kind_name()
                    ))
                })?;
                normalize_hex(s, PUBLIC_KEY_HEX_LEN, "delegated public key")
            })
            .collect::<MetatrustResult<BTreeSet<_>>>()?;

        let threshold = match obj.get("threshold") {
            Some(Payload::Integer(t)) if *t >= 1 => u64::try_from(*t)
                .map_err(|_| MetatrustError::format(format!("delegation threshold {t} is too large")))?,
            Some(Payload::Integer(t)) => {
                return Err(MetatrustError::format(format!(
                    "delegation threshold must be at least 1, found {t}"
                )))
            }
            Some(other) => {
                return Err(MetatrustError::format(format!(
                    "delegation threshold must be an integer, found {}",
                    other.kind_name()
                )))
            }
            None => return Err(MetatrustError::format("delegation is missing \"threshold\"")),
        };

        Ok(Self { pubkeys, threshold })
    }

    pub fn to_payload(&self) -> Payload {
        let mut m = BTreeMap::new();
        m.insert(
            "pubkeys".to_string(),
            Payload::List(self.pubkeys.iter().map(|k| Payload::from(k.as_str())).collect()),
        );
        m.insert("threshold".to_string(), Payload::from(self.threshold));
        Payload::Object(m)
    }
}

/// Look up one role's delegation in a signed payload.
///
/// A missing `delegations` object and a missing role are both
/// `UnknownDelegation`; a present but malformed record is a `Format` fault.
pub fn delegation_for(signed: &Payload, role: &str) -> MetatrustResult<Delegation> {
    let delegations = match signed.get("delegations") {
        None => return Err(MetatrustError::unknown_delegation(role)),
        Some(Payload::Object(m)) => m,
        Some(other) => {
            return Err(MetatrustError::format(format!(
                "\"delegations\" must be an object, found {}",
                other.kind_name()
            )))
        }
    };
    let record = delegations
        .get(role)
        .ok_or_else(|| MetatrustError::unknown_delegation(role))?;
    Delegation::from_payload(record)
}

/// All delegations of a piece of delegating metadata, keyed by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delegations(BTreeMap<String, Delegation>);

impl Delegations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: &str) -> Option<&Delegation> {
        self.0.get(role)
    }

    pub fn get_mut(&mut self, role: &str) -> Option<&mut Delegation> {
        self.0.get_mut(role)
    }

    pub fn insert(&mut self, role: impl Into<String>, delegation: Delegation) -> Option<Delegation> {
        self.0.insert(role.into(), delegation)
    }

    pub fn remove(&mut self, role: &str) -> Option<Delegation> {
        self.0.remove(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Delegation)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_payload(p: &Payload) -> MetatrustResult<Self> {
        let obj = p.as_object().ok_or_else(|| {
            MetatrustError::format(format!(
                "\"delegations\" must be an object, found {}",
                p.kind_name()
            ))
        })?;
        obj.iter()
            .map(|(role, d)| {
                Delegation::from_payload(d)
                    .map(|d| (role.clone(), d))
                    .map_err(|e| MetatrustError::format(format!("delegation \"{role}\": {e}")))
            })
            .collect::<MetatrustResult<BTreeMap<_, _>>>()
            .map(Self)
    }

    /// The `delegations` member of a signed payload, if present.
    pub fn from_signed(signed: &Payload) -> MetatrustResult<Option<Self>> {
        signed
            .get("delegations")
            .map(Self::from_payload)
            .transpose()
    }

    pub fn to_payload(&self) -> Payload {
        Payload::Object(
            self.0
                .iter()
                .map(|(role, d)| (role.clone(), d.to_payload()))
                .collect(),
        )
    }
}

/// Typed view of root metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMetadata {
    pub version: i128,
    pub timestamp: Option<String>,
    pub expiration: Option<String>,
    pub delegations: Delegations,
}

impl RootMetadata {
    /// Parse the signed part of a root envelope.
    ///
    /// A payload of another type is `RoleMismatch`; a bad version, missing
    /// delegations or missing root delegation is a `Format` fault.
    pub fn from_signed(signed: &Payload) -> MetatrustResult<Self> {
        let t = metadata_type(signed)?;
        if t != ROOT_ROLE {
            return Err(MetatrustError::role_mismatch(ROOT_ROLE, t));
        }

        let version = read_version(signed)?;
        let delegations = Delegations::from_signed(signed)?
            .ok_or_else(|| MetatrustError::format("root metadata is missing \"delegations\""))?;
        if delegations.get(ROOT_ROLE).is_none() {
            return Err(MetatrustError::format(
                "root metadata does not delegate the \"root\" role",
            ));
        }

        let text = |name: &str| -> MetatrustResult<Option<String>> {
            match signed.get(name) {
                None => Ok(None),
                Some(Payload::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(MetatrustError::format(format!(
                    "root \"{name}\" must be a string, found {}",
                    other.kind_name()
                ))),
            }
        };

        Ok(Self {
            version,
            timestamp: text("timestamp")?,
            expiration: text("expiration")?,
            delegations,
        })
    }

    pub fn from_envelope(env: &Envelope) -> MetatrustResult<Self> {
        Self::from_signed(env.signed())
    }

    /// The root delegation. Always present on a parsed value.
    pub fn root_delegation(&self) -> Option<&Delegation> {
        self.delegations.get(ROOT_ROLE)
    }
}

/// Build the signed part of a piece of delegating metadata.
///
/// `timestamp` defaults to now, `expiration` to `timestamp + DEFAULT_EXPIRY`.
pub fn build_delegating_metadata(
    metadata_type: &str,
    delegations: Option<&Delegations>,
    version: u64,
    timestamp: Option<OffsetDateTime>,
    expiration: Option<OffsetDateTime>,
) -> MetatrustResult<Payload> {
    if metadata_type.is_empty() {
        return Err(MetatrustError::format("metadata type must not be empty"));
    }
    if version < 1 {
        return Err(MetatrustError::format("metadata version must be at least 1"));
    }

    let timestamp = timestamp.unwrap_or_else(OffsetDateTime::now_utc);
    let expiration = match expiration {
        Some(e) => e,
        None => timestamp
            .checked_add(DEFAULT_EXPIRY)
            .ok_or_else(|| MetatrustError::format("expiration out of range"))?,
    };
    if expiration <= timestamp {
        return Err(MetatrustError::format("expiration must be after timestamp"));
    }

    let mut m = BTreeMap::new();
    m.insert("type".to_string(), Payload::from(metadata_type));
    m.insert("version".to_string(), Payload::from(version));
    m.insert(
        "metadata_spec_version".to_string(),
        Payload::from(METADATA_SPEC_VERSION),
    );
    m.insert("timestamp".to_string(), Payload::String(format_iso8601(timestamp)?));
    m.insert("expiration".to_string(), Payload::String(format_iso8601(expiration)?));
    if let Some(d) = delegations {
        m.insert("delegations".to_string(), d.to_payload());
    }
    Ok(Payload::Object(m))
}

/// Build the signed part of root metadata, optionally delegating `key_mgr`.
pub fn build_root_metadata(
    root: Delegation,
    key_mgr: Option<Delegation>,
    version: u64,
    timestamp: Option<OffsetDateTime>,
    expiration: Option<OffsetDateTime>,
) -> MetatrustResult<Payload> {
    let mut delegations = Delegations::new();
    delegations.insert(ROOT_ROLE, root);
    if let Some(km) = key_mgr {
        delegations.insert(KEY_MGR_ROLE, km);
    }
    build_delegating_metadata(ROOT_ROLE, Some(&delegations), version, timestamp, expiration)
}
