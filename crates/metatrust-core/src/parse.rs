//! Parsing helpers for metatrust inputs.
//!
//! Core crate avoids filesystem/network I/O. Parsing helpers in this module operate on:
//! - in-memory bytes
//! - in-memory JSON values
//!
//! This module provides:
//! - strict JSON parsing with size limits
//! - envelope and payload decoding with helpful error messages for CLI consumers

use serde_json::Value;

use crate::config::LimitsConfig;
use crate::determinism::canonical_json::check_depth_limit;
use crate::errors::{MetatrustError, MetatrustResult};
use crate::model::{Envelope, Payload};

/// Parse JSON bytes into `serde_json::Value` with a hard size limit.
pub fn parse_json_bytes(bytes: &[u8], max_bytes: usize) -> MetatrustResult<Value> {
    if bytes.len() > max_bytes {
        return Err(MetatrustError::format(format!(
            "JSON document too large ({} bytes > limit {})",
            bytes.len(),
            max_bytes
        )));
    }

    serde_json::from_slice(bytes)
        .map_err(|e| MetatrustError::serialization(format!("failed to parse JSON: {e}")))
}

/// Parse JSON bytes into a payload.
pub fn parse_payload_bytes(bytes: &[u8], limits: &LimitsConfig) -> MetatrustResult<Payload> {
    let v = parse_json_bytes(bytes, limits.max_json_bytes)?;
    let p = Payload::try_from(v)?;
    check_depth_limit(&p, limits)?;
    Ok(p)
}

/// Parse JSON bytes into an envelope.
pub fn parse_envelope_bytes(bytes: &[u8], limits: &LimitsConfig) -> MetatrustResult<Envelope> {
    let p = parse_payload_bytes(bytes, limits)?;
    Envelope::from_payload(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn size_limit() {
        let e = parse_json_bytes(b"{\"a\": 1}", 3).unwrap_err();
        assert_matches!(e, MetatrustError::Format(_));
    }

    #[test]
    fn syntax_error_is_serialization() {
        assert_matches!(parse_json_bytes(b"{", 100), Err(MetatrustError::Serialization(_)));
    }

    #[test]
    fn depth_limit_applies_to_parsed_input() {
        let limits = LimitsConfig {
            max_depth: 2,
            ..LimitsConfig::default()
        };
        assert!(parse_payload_bytes(b"[[[[1]]]]", &limits).is_err());
        assert!(parse_payload_bytes(b"[[1]]", &limits).is_ok());
    }

    #[test]
    fn envelope_from_bytes() {
        let bytes = br#"{"signatures": {}, "signed": {"type": "root", "version": 1}}"#;
        let env = parse_envelope_bytes(bytes, &LimitsConfig::default()).unwrap();
        assert_eq!(env.metadata_type().unwrap(), "root");
    }

    #[test]
    fn integers_beyond_64_bits_keep_their_digits() {
        let bytes = br#"{"signatures":{},"signed":{"n":18446744073709551616,"type":"x"}}"#;
        let env = parse_envelope_bytes(bytes, &LimitsConfig::default()).unwrap();
        let signed = String::from_utf8(env.signed_bytes().unwrap()).unwrap();
        assert!(signed.contains("\"n\": 18446744073709551616"), "{signed}");
    }

    #[test]
    fn integers_beyond_128_bits_are_refused() {
        let bytes = br#"{"signatures":{},"signed":{"n":1000000000000000000000000000000000000000}}"#;
        assert_matches!(
            parse_envelope_bytes(bytes, &LimitsConfig::default()),
            Err(MetatrustError::UnsupportedPayload(_))
        );
    }
}
