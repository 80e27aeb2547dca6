//! Metadata version helpers.
//!
//! Versions are positive integers carried in the `version` field of signed
//! metadata. Root versions advance by exactly one per rotation; anything else
//! is reported as a version mismatch with stable error codes.

use crate::errors::{MetatrustError, MetatrustResult};
use crate::model::Payload;

/// Read the `version` field of a signed payload. Must be an integer >= 1.
pub fn read_version(signed: &Payload) -> MetatrustResult<i128> {
    match signed.get("version") {
        Some(Payload::Integer(v)) if *v >= 1 => Ok(*v),
        Some(Payload::Integer(v)) => Err(MetatrustError::format(format!(
            "metadata version must be at least 1, found {v}"
        ))),
        Some(other) => Err(MetatrustError::format(format!(
            "metadata version must be an integer, found {}",
            other.kind_name()
        ))),
        None => Err(MetatrustError::format("metadata is missing \"version\"")),
    }
}

/// The version that must follow `trusted`.
pub fn next_version(trusted: i128) -> MetatrustResult<i128> {
    trusted
        .checked_add(1)
        .ok_or_else(|| MetatrustError::format(format!("version {trusted} cannot be incremented")))
}

/// Validate that `found` is exactly one more than `trusted`.
pub fn require_successor(trusted: i128, found: i128) -> MetatrustResult<()> {
    let expected = next_version(trusted)?;
    if found == expected {
        Ok(())
    } else {
        Err(MetatrustError::VersionMismatch {
            trusted,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn read_version_ok() {
        assert_eq!(read_version(&Payload::try_from(json!({"version": 4})).unwrap()).unwrap(), 4);
    }

    #[test]
    fn read_version_rejects_bad_values() {
        for v in [json!({"version": 0}), json!({"version": "1"}), json!({"version": 1.0}), json!({})] {
            assert_matches!(read_version(&Payload::try_from(v).unwrap()), Err(MetatrustError::Format(_)));
        }
    }

    #[test]
    fn successor_ok() {
        require_successor(4, 5).unwrap();
    }

    #[test]
    fn successor_err() {
        for found in [4, 6, 3] {
            let e = require_successor(4, found).unwrap_err();
            assert_matches!(e, MetatrustError::VersionMismatch { expected: 5, .. });
            assert!(e.to_string().contains("5"));
        }
    }
}
