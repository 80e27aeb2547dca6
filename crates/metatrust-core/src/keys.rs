//! Key codec: fixed-length cryptographic values as lowercase hex.
//!
//! | value | bytes | hex chars |
//! | --- | --- | --- |
//! | private key seed | 32 | 64 |
//! | public key | 32 | 64 |
//! | signature | 64 | 128 |
//! | OpenPGP fingerprint | 20 | 40 |
//!
//! All parsing goes through [`normalize_hex`], so input is accepted regardless
//! of case or embedded whitespace and always re-emitted in lowercase.

use std::fmt;

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};

use crate::determinism::normalize_hex::normalize_hex;
use crate::errors::{MetatrustError, MetatrustResult};

pub const PRIVATE_KEY_HEX_LEN: usize = 64;
pub const PUBLIC_KEY_HEX_LEN: usize = 64;
pub const SIGNATURE_HEX_LEN: usize = 128;
pub const FINGERPRINT_HEX_LEN: usize = 40;

fn decode_fixed<const N: usize>(hex_text: &str, what: &str) -> MetatrustResult<[u8; N]> {
    let normalized = normalize_hex(hex_text, N * 2, what)?;
    let mut out = [0u8; N];
    hex::decode_to_slice(&normalized, &mut out)
        .map_err(|e| MetatrustError::format(format!("invalid {what}: {e}")))?;
    Ok(out)
}

/// True if `s` normalizes to a 64-hex-character key value.
pub fn is_hex_key(s: &str) -> bool {
    normalize_hex(s, PUBLIC_KEY_HEX_LEN, "key").is_ok()
}

/// True if `s` normalizes to a 40-hex-character OpenPGP fingerprint.
pub fn is_gpg_fingerprint(s: &str) -> bool {
    normalize_hex(s, FINGERPRINT_HEX_LEN, "fingerprint").is_ok()
}

/// An ed25519 private key (32-byte seed).
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    pub fn from_hex(hex_text: &str) -> MetatrustResult<Self> {
        let seed = decode_fixed::<32>(hex_text, "private key")?;
        Ok(Self::from_bytes(&seed))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Sign a message. Ed25519 is deterministic: the same key and message
    /// always produce the same signature.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes(self.0.sign(message))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> MetatrustResult<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| MetatrustError::format(format!("invalid ed25519 public key: {e}")))
    }

    pub fn from_hex(hex_text: &str) -> MetatrustResult<Self> {
        let bytes = decode_fixed::<32>(hex_text, "public key")?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Lowercase hex; this is the form used to index signature maps.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Check a signature. An invalid signature is a normal `false`, not an error.
    pub fn verify(&self, message: &[u8], signature: &SignatureBytes) -> bool {
        self.0.verify_strict(message, &signature.0).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A 64-byte ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignatureBytes(ed25519_dalek::Signature);

impl SignatureBytes {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn from_hex(hex_text: &str) -> MetatrustResult<Self> {
        let bytes = decode_fixed::<64>(hex_text, "signature")?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({})", self.to_hex())
    }
}

/// A 20-byte OpenPGP v4 key fingerprint, normalized to lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex_text: &str) -> MetatrustResult<Self> {
        normalize_hex(hex_text, FINGERPRINT_HEX_LEN, "OpenPGP fingerprint").map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
