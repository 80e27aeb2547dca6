//! Hex text normalization.
//!
//! Keys, signatures and fingerprints arrive from many places: files written
//! by other tools, operator-pasted GPG output with odd spacing, mixed case.
//! Everything is normalized here before it is compared or decoded.
//!
//! Rules:
//! - remove all whitespace, including U+00A0 (GPG prints it in fingerprints)
//! - lowercase
//! - require an exact length and the `[0-9a-f]` alphabet

use crate::errors::{MetatrustError, MetatrustResult};

/// Strip whitespace and lowercase, without validating.
pub fn strip_and_lowercase(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalize hex text and enforce an exact length.
///
/// `what` names the value in error messages ("public key", "signature", ...).
pub fn normalize_hex(input: &str, expected_len: usize, what: &str) -> MetatrustResult<String> {
    let out = strip_and_lowercase(input);

    if out.len() != expected_len {
        return Err(MetatrustError::format(format!(
            "{what} must be {expected_len} hex characters, got {}",
            out.chars().count()
        )));
    }

    if let Some(bad) = out.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(MetatrustError::format(format!(
            "{what} contains non-hex character {bad:?}"
        )));
    }

    Ok(out)
}

/// Normalize hex text of any even length (e.g. OpenPGP header data).
pub fn normalize_hex_any(input: &str, what: &str) -> MetatrustResult<String> {
    let out = strip_and_lowercase(input);
    if out.len() % 2 != 0 {
        return Err(MetatrustError::format(format!(
            "{what} must have an even number of hex characters"
        )));
    }
    if let Some(bad) = out.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(MetatrustError::format(format!(
            "{what} contains non-hex character {bad:?}"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpg_style_fingerprint_is_normalized() {
        let spaced = "94A3 EED0 806C 1F10 7754  A446 FDAD 11B8 2DD4 0E8C";
        let nbsp = "94A3\u{a0}EED0806C1F107754A446FDAD11B82DD40E8C";
        let want = "94a3eed0806c1f107754a446fdad11b82dd40e8c";
        assert_eq!(normalize_hex(spaced, 40, "fingerprint").unwrap(), want);
        assert_eq!(normalize_hex(nbsp, 40, "fingerprint").unwrap(), want);
    }

    #[test]
    fn wrong_length_rejected() {
        let err = normalize_hex("abcd", 64, "public key").unwrap_err();
        assert!(err.to_string().contains("64 hex characters"));
    }

    #[test]
    fn non_hex_rejected() {
        let err = normalize_hex("zz", 2, "byte").unwrap_err();
        assert!(err.to_string().contains("non-hex"));
    }

    #[test]
    fn odd_length_rejected() {
        assert!(normalize_hex_any("abc", "headers").is_err());
        assert_eq!(normalize_hex_any("AB CD", "headers").unwrap(), "abcd");
    }
}
