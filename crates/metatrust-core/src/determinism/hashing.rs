//! Digests used by OpenPGP-produced signatures.
//!
//! An OpenPGP (v4) signature does not cover the message directly. The signer
//! hashes the message followed by the signature's own hashed header fields
//! and a trailer, and the ed25519 signature covers that digest. Verification
//! recomputes the same digest from the canonical bytes and the record's
//! `other_headers`.

use sha2::{Digest, Sha256};

/// OpenPGP v4 signature trailer marker: version 4, then 0xff.
const V4_TRAILER: [u8; 2] = [0x04, 0xff];

/// Digest an OpenPGP v4 SHA-256 signature is computed over.
///
/// `sha256(message || other_headers || 0x04 0xff || be32(len(other_headers)))`
pub fn openpgp_signature_digest(message: &[u8], other_headers: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(message);
    h.update(other_headers);
    h.update(V4_TRAILER);
    h.update((other_headers.len() as u32).to_be_bytes());
    h.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openpgp_digest_depends_on_headers() {
        let a = openpgp_signature_digest(b"msg", &[0x04, 0x00]);
        let b = openpgp_signature_digest(b"msg", &[0x04, 0x01]);
        assert_ne!(a, b);
        // The trailer is appended: equivalent to hashing the concatenation.
        let manual = Sha256::digest([b"msg".as_slice(), &[0x04, 0x00, 0x04, 0xff, 0, 0, 0, 2]].concat());
        assert_eq!(a, <[u8; 32]>::from(manual));
    }
}
