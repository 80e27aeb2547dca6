//! OpenPGP signatures from an external `gpg` program.
//!
//! Root keys may live on hardware tokens that only expose an OpenPGP
//! interface. Such a token cannot sign the canonical bytes directly: gpg
//! appends the signature's own hashed header fields and a trailer and signs
//! the SHA-256 of the result (see `determinism::hashing`). The record stored
//! in the envelope keeps those header bytes as `other_headers` so a verifier
//! can recompute the digest without any OpenPGP machinery.
//!
//! Verification ([`verify_openpgp`]) is always available. Talking to gpg and
//! reading its packets (through sequoia) needs the `gpg` feature.

use crate::config::SignerConfig;
use crate::determinism::hashing::openpgp_signature_digest;
use crate::errors::{MetatrustError, MetatrustResult};
use crate::keys::{Fingerprint, PublicKey, SignatureBytes};
use crate::model::SignatureRecord;
use crate::signing::Signer;

#[cfg(feature = "gpg")]
pub use backend::{fetch_public_key, find_ed25519_key, parse_detached_signature};

/// Verify an OpenPGP-style ed25519 signature over `message`.
pub fn verify_openpgp(
    public_key: &PublicKey,
    message: &[u8],
    other_headers: &[u8],
    signature: &SignatureBytes,
) -> bool {
    let digest = openpgp_signature_digest(message, other_headers);
    public_key.verify(&digest, signature)
}

/// The parts of a v4 EdDSA signature a verifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPgpSignature {
    /// `r || s`.
    pub signature: SignatureBytes,
    /// Version, type and algorithm octets followed by the length-prefixed
    /// hashed subpacket area.
    pub other_headers: Vec<u8>,
}

impl OpenPgpSignature {
    pub fn verify(&self, public_key: &PublicKey, message: &[u8]) -> bool {
        verify_openpgp(public_key, message, &self.other_headers, &self.signature)
    }

    pub fn to_record(&self, signer: &Fingerprint) -> SignatureRecord {
        SignatureRecord {
            signature: self.signature.to_hex(),
            other_headers: Some(hex::encode(&self.other_headers)),
            see_also: Some(signer.as_str().to_string()),
        }
    }
}

/// Signer backed by a gpg-managed Ed25519 key.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "gpg"), allow(dead_code))]
pub struct GpgSigner {
    fingerprint: Fingerprint,
    public_key: PublicKey,
    config: SignerConfig,
}

#[cfg(not(feature = "gpg"))]
fn unavailable() -> MetatrustError {
    MetatrustError::signer("OpenPGP signing is unavailable: built without the \"gpg\" feature")
}

impl GpgSigner {
    /// Resolve `fingerprint` through gpg and prepare to sign with it.
    #[cfg(feature = "gpg")]
    pub fn new(fingerprint: &str, config: SignerConfig) -> MetatrustResult<Self> {
        let fingerprint = Fingerprint::from_hex(fingerprint)?;
        let public_key = fetch_public_key(&fingerprint, &config)?;
        Ok(Self {
            fingerprint,
            public_key,
            config,
        })
    }

    #[cfg(not(feature = "gpg"))]
    pub fn new(_fingerprint: &str, _config: SignerConfig) -> MetatrustResult<Self> {
        Err(unavailable())
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The raw ed25519 key behind the OpenPGP key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[cfg(feature = "gpg")]
    fn detached_signature(&self, message: &[u8]) -> MetatrustResult<OpenPgpSignature> {
        backend::sign_detached(&self.config, &self.fingerprint, message)
    }

    #[cfg(not(feature = "gpg"))]
    fn detached_signature(&self, _message: &[u8]) -> MetatrustResult<OpenPgpSignature> {
        Err(unavailable())
    }
}

impl Signer for GpgSigner {
    fn public_key_hex(&self) -> MetatrustResult<String> {
        Ok(self.public_key.to_hex())
    }

    fn sign_record(&self, message: &[u8]) -> MetatrustResult<SignatureRecord> {
        let parsed = self.detached_signature(message)?;
        if !parsed.verify(&self.public_key, message) {
            return Err(MetatrustError::signer(format!(
                "gpg signature does not verify under the key for {}",
                self.fingerprint
            )));
        }
        Ok(parsed.to_record(&self.fingerprint))
    }
}

#[cfg(feature = "gpg")]
mod backend {
    use std::io::{Read, Write};
    use std::process::{Child, Command, Stdio};
    use std::thread;
    use std::time::{Duration, Instant};

    use sequoia_openpgp::crypto::mpi;
    use sequoia_openpgp::parse::Parse;
    use sequoia_openpgp::serialize::MarshalInto;
    use sequoia_openpgp::types::{Curve, HashAlgorithm, PublicKeyAlgorithm};
    use sequoia_openpgp::{Cert, Packet, PacketPile};

    use super::OpenPgpSignature;
    use crate::config::SignerConfig;
    use crate::errors::{MetatrustError, MetatrustResult};
    use crate::keys::{Fingerprint, PublicKey, SignatureBytes};

    const POLL_INTERVAL: Duration = Duration::from_millis(25);

    fn malformed(what: &str, e: impl std::fmt::Display) -> MetatrustError {
        MetatrustError::format(format!("malformed OpenPGP {what}: {e}"))
    }

    fn left_pad<const N: usize>(value: &[u8], what: &str) -> MetatrustResult<[u8; N]> {
        if value.len() > N {
            return Err(MetatrustError::format(format!(
                "OpenPGP {what} is {} bytes, expected at most {N}",
                value.len()
            )));
        }
        let mut out = [0u8; N];
        out[N - value.len()..].copy_from_slice(value);
        Ok(out)
    }

    /// Read the first signature packet of a binary detached signature.
    pub fn parse_detached_signature(data: &[u8]) -> MetatrustResult<OpenPgpSignature> {
        let pile = PacketPile::from_bytes(data).map_err(|e| malformed("signature", e))?;
        let sig = pile
            .descendants()
            .find_map(|p| match p {
                Packet::Signature(sig) => Some(sig),
                _ => None,
            })
            .ok_or_else(|| MetatrustError::format("no OpenPGP signature packet found"))?;

        if sig.version() != 4 {
            return Err(MetatrustError::format(format!(
                "unsupported OpenPGP signature version {}",
                sig.version()
            )));
        }
        if sig.pk_algo() != PublicKeyAlgorithm::EdDSA {
            return Err(MetatrustError::format(format!(
                "unsupported OpenPGP signature algorithm {} (expected EdDSA)",
                sig.pk_algo()
            )));
        }
        if sig.hash_algo() != HashAlgorithm::SHA256 {
            return Err(MetatrustError::format(format!(
                "unsupported OpenPGP hash algorithm {} (expected SHA256)",
                sig.hash_algo()
            )));
        }

        let mut rs = [0u8; 64];
        match sig.mpis() {
            mpi::Signature::EdDSA { r, s } => {
                rs[..32].copy_from_slice(&left_pad::<32>(r.value(), "signature r")?);
                rs[32..].copy_from_slice(&left_pad::<32>(s.value(), "signature s")?);
            }
            _ => return Err(MetatrustError::format("OpenPGP signature carries no EdDSA values")),
        }

        let hashed = sig
            .hashed_area()
            .to_vec()
            .map_err(|e| malformed("hashed subpackets", e))?;
        let hashed_len = u16::try_from(hashed.len())
            .map_err(|_| MetatrustError::format("OpenPGP hashed subpacket area too large"))?;

        let mut other_headers = vec![
            4,
            u8::from(sig.typ()),
            u8::from(sig.pk_algo()),
            u8::from(sig.hash_algo()),
        ];
        other_headers.extend_from_slice(&hashed_len.to_be_bytes());
        other_headers.extend_from_slice(&hashed);

        Ok(OpenPgpSignature {
            signature: SignatureBytes::from_bytes(&rs),
            other_headers,
        })
    }

    fn ed25519_point(mpis: &mpi::PublicKey) -> MetatrustResult<PublicKey> {
        match mpis {
            mpi::PublicKey::EdDSA {
                curve: Curve::Ed25519,
                q,
            } => {
                let (x, _) = q
                    .decode_point(&Curve::Ed25519)
                    .map_err(|e| malformed("Ed25519 point", e))?;
                let raw = <[u8; 32]>::try_from(x)
                    .map_err(|_| MetatrustError::format("OpenPGP Ed25519 point has the wrong length"))?;
                PublicKey::from_bytes(&raw)
            }
            _ => Err(MetatrustError::format("OpenPGP key is not an Ed25519 signing key")),
        }
    }

    /// Find the ed25519 key (primary or subkey) with the given fingerprint in a
    /// binary export.
    pub fn find_ed25519_key(export: &[u8], fingerprint: &Fingerprint) -> MetatrustResult<PublicKey> {
        let cert = Cert::from_bytes(export).map_err(|e| malformed("key export", e))?;
        for ka in cert.keys() {
            let key = ka.key();
            if key.fingerprint().to_hex().eq_ignore_ascii_case(fingerprint.as_str()) {
                return ed25519_point(key.mpis());
            }
        }
        Err(MetatrustError::signer(format!(
            "no key with fingerprint {fingerprint} in gpg output"
        )))
    }

    fn abort(child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }

    /// Run the configured program with `args`, feeding `input` on stdin, and
    /// return stdout. The child is killed once `cfg.timeout` has elapsed since
    /// the call started, whatever it is blocked on.
    pub(super) fn run_gpg(cfg: &SignerConfig, args: &[&str], input: &[u8]) -> MetatrustResult<Vec<u8>> {
        let program = cfg.gpg_program.display().to_string();
        let deadline = Instant::now() + cfg.timeout;
        tracing::debug!(%program, ?args, "running gpg");

        let mut child = Command::new(&cfg.gpg_program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MetatrustError::signer(format!("cannot start {program}: {e}")))?;

        // Readers and the writer run on their own threads so a child that stops
        // reading or writing cannot hold up the deadline below.
        let stdin = child.stdin.take();
        let input = input.to_vec();
        let writer = thread::spawn(move || match stdin {
            Some(mut s) => s.write_all(&input),
            None => Ok(()),
        });
        let stdout = child.stdout.take();
        let out_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut s) = stdout {
                let _ = s.read_to_end(&mut buf);
            }
            buf
        });
        let stderr = child.stderr.take();
        let err_reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut s) = stderr {
                let _ = s.read_to_string(&mut buf);
            }
            buf
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    abort(&mut child);
                    tracing::warn!(%program, "gpg timed out and was killed");
                    return Err(MetatrustError::signer(format!(
                        "{program} did not finish within {}s",
                        cfg.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    abort(&mut child);
                    return Err(MetatrustError::signer(format!("waiting for {program}: {e}")));
                }
            }
        };

        let written = writer.join().unwrap_or(Ok(()));
        let out = out_reader.join().unwrap_or_default();
        let err = err_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(MetatrustError::signer(format!(
                "{program} exited with {status}: {}",
                err.trim()
            )));
        }
        written.map_err(|e| MetatrustError::signer(format!("cannot write to {program}: {e}")))?;
        Ok(out)
    }

    /// Ask gpg for the raw ed25519 key behind `fingerprint`.
    pub fn fetch_public_key(fingerprint: &Fingerprint, cfg: &SignerConfig) -> MetatrustResult<PublicKey> {
        let export = run_gpg(cfg, &["--export", fingerprint.as_str()], &[])?;
        if export.is_empty() {
            return Err(MetatrustError::signer(format!(
                "gpg does not know a key with fingerprint {fingerprint}"
            )));
        }
        find_ed25519_key(&export, fingerprint)
    }

    pub(super) fn sign_detached(
        cfg: &SignerConfig,
        fingerprint: &Fingerprint,
        message: &[u8],
    ) -> MetatrustResult<OpenPgpSignature> {
        // "!" pins the exact (sub)key instead of letting gpg pick one.
        let user = format!("{fingerprint}!");
        let out = run_gpg(
            cfg,
            &[
                "--detach-sign",
                "--digest-algo",
                "SHA256",
                "--local-user",
                &user,
                "--output",
                "-",
            ],
            message,
        )?;
        parse_detached_signature(&out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keys::PrivateKey;

    /// Hand-assembled v4 EdDSA/SHA256 headers with one creation-time subpacket.
    const HEADERS: [u8; 12] = [4, 0x00, 22, 8, 0x00, 0x06, 5, 2, 0x60, 0, 0, 0];

    /// The record gpg would yield for `message` signed with `key`.
    pub(crate) fn openpgp_record(key: &PrivateKey, message: &[u8]) -> SignatureRecord {
        let sig = key.sign(&openpgp_signature_digest(message, &HEADERS));
        OpenPgpSignature {
            signature: sig,
            other_headers: HEADERS.to_vec(),
        }
        .to_record(&Fingerprint::from_hex(&"22".repeat(20)).unwrap())
    }

    #[test]
    fn headers_are_part_of_the_signed_digest() {
        let key = PrivateKey::from_bytes(&[9u8; 32]);
        let sig = key.sign(&openpgp_signature_digest(b"canonical bytes", &HEADERS));
        let pk = key.public_key();

        assert!(verify_openpgp(&pk, b"canonical bytes", &HEADERS, &sig));
        assert!(!verify_openpgp(&pk, b"other bytes", &HEADERS, &sig));
        let mut altered = HEADERS;
        altered[8] = 0x61;
        assert!(!verify_openpgp(&pk, b"canonical bytes", &altered, &sig));
        // Raw ed25519 over the message is not an OpenPGP signature.
        assert!(!pk.verify(b"canonical bytes", &sig));
    }

    #[test]
    fn record_names_the_signing_fingerprint() {
        let rec = openpgp_record(&PrivateKey::from_bytes(&[9u8; 32]), b"m");
        assert!(rec.is_openpgp());
        assert_eq!(rec.other_headers.as_deref(), Some(hex::encode(HEADERS).as_str()));
        assert_eq!(rec.see_also.as_deref().map(str::len), Some(40));
    }

    #[cfg(feature = "gpg")]
    mod with_gpg {
        use std::time::{Duration, Instant};

        use sequoia_openpgp::cert::{CertBuilder, CipherSuite};
        use sequoia_openpgp::packet::signature::SignatureBuilder;
        use sequoia_openpgp::serialize::MarshalInto;
        use sequoia_openpgp::types::{HashAlgorithm, KeyFlags, SignatureType};
        use sequoia_openpgp::{Cert, Packet, Profile};

        use super::super::backend::run_gpg;
        use super::*;
        use crate::errors::ErrorKind;

        fn ed25519_cert() -> Cert {
            let (cert, _revocation) = CertBuilder::new()
                .set_profile(Profile::RFC4880)
                .unwrap()
                .set_cipher_suite(CipherSuite::Cv25519)
                .add_userid("Root Key <root@example.com>")
                .set_primary_key_flags(KeyFlags::signing())
                .generate()
                .unwrap();
            cert
        }

        /// What `gpg --detach-sign --digest-algo SHA256` writes for `message`.
        fn detached(cert: &Cert, message: &[u8]) -> Vec<u8> {
            let mut keypair = cert
                .primary_key()
                .key()
                .clone()
                .parts_into_secret()
                .unwrap()
                .into_keypair()
                .unwrap();
            let sig = SignatureBuilder::new(SignatureType::Binary)
                .set_hash_algo(HashAlgorithm::SHA256)
                .sign_message(&mut keypair, message)
                .unwrap();
            Packet::from(sig).to_vec().unwrap()
        }

        fn fingerprint_of(cert: &Cert) -> Fingerprint {
            Fingerprint::from_hex(&cert.fingerprint().to_hex()).unwrap()
        }

        #[test]
        fn gpg_output_verifies_against_exported_key() {
            let cert = ed25519_cert();
            let export = cert.to_vec().unwrap();
            let fpr = fingerprint_of(&cert);

            let key = find_ed25519_key(&export, &fpr).unwrap();
            let sig = parse_detached_signature(&detached(&cert, b"canonical bytes")).unwrap();

            assert!(sig.verify(&key, b"canonical bytes"));
            assert!(!sig.verify(&key, b"other bytes"));
            assert_eq!(&sig.other_headers[..4], &[4, 0x00, 22, 8]);

            let rec = sig.to_record(&fpr);
            assert!(rec.is_openpgp());
            assert_eq!(rec.see_also.as_deref(), Some(fpr.as_str()));
        }

        #[test]
        fn unknown_fingerprint_is_signer_fault() {
            let export = ed25519_cert().to_vec().unwrap();
            let unknown = Fingerprint::from_hex(&"00".repeat(20)).unwrap();
            let e = find_ed25519_key(&export, &unknown).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::Signer);
        }

        #[test]
        fn garbage_is_format_fault() {
            let e = parse_detached_signature(b"not an openpgp packet").unwrap_err();
            assert_eq!(e.kind(), ErrorKind::Format);
            let fpr = Fingerprint::from_hex(&"ab".repeat(20)).unwrap();
            assert!(find_ed25519_key(b"junk", &fpr).is_err());
        }

        #[test]
        fn missing_program_is_signer_fault() {
            let cfg = SignerConfig {
                gpg_program: "/nonexistent/metatrust-gpg".into(),
                ..SignerConfig::default()
            };
            let fpr = Fingerprint::from_hex(&"ab".repeat(20)).unwrap();
            let e = fetch_public_key(&fpr, &cfg).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::Signer);
        }

        /// A program that never reads its input nor exits.
        #[cfg(unix)]
        fn stalled_program(dir: &std::path::Path) -> std::path::PathBuf {
            use std::os::unix::fs::PermissionsExt;

            let script = dir.join("stalled-gpg");
            std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        #[cfg(unix)]
        #[test]
        fn stalled_gpg_is_killed_at_the_deadline() {
            let dir = tempfile::tempdir().unwrap();
            let cfg = SignerConfig {
                gpg_program: stalled_program(dir.path()),
                timeout: Duration::from_secs(1),
            };

            // Far more than a pipe buffer, so writing stdin blocks too.
            let input = vec![b'x'; 4 * 1024 * 1024];
            let started = Instant::now();
            let e = run_gpg(&cfg, &["--detach-sign"], &input).unwrap_err();

            assert_eq!(e.kind(), ErrorKind::Signer);
            assert!(e.to_string().contains("did not finish within 1s"), "{e}");
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }

    #[cfg(not(feature = "gpg"))]
    #[test]
    fn unavailable_without_feature() {
        let e = GpgSigner::new(&"ab".repeat(20), SignerConfig::default()).unwrap_err();
        assert_eq!(e.code(), "signer");
    }
}
