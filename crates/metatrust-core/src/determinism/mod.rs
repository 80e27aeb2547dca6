//! Deterministic encoding primitives.
//!
//! - `canonical_json`: the byte encoding signatures cover
//! - `normalize_hex`: whitespace/case normalization for hex text
//! - `hashing`: digests for OpenPGP-produced signatures

pub mod canonical_json;
pub mod hashing;
pub mod normalize_hex;
