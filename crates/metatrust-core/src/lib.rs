//! metatrust-core
//!
//! Core primitives for signed repository metadata:
//! - Canonical JSON encoding (the exact bytes signatures cover)
//! - ed25519 key and signature codecs (hex on the wire)
//! - Signable envelopes and signing backends (native keys, OpenPGP via gpg)
//! - Threshold verification of delegated metadata
//! - Root rotation verification
//! - Edit proposals for producing new metadata versions

pub mod config;
pub mod determinism;
pub mod edit;
pub mod errors;
pub mod keys;
pub mod model;
pub mod parse;
pub mod signing;
pub mod verify;
pub mod version;

pub use crate::errors::{MetatrustError, MetatrustResult};

pub use crate::model::metadata::METADATA_SPEC_VERSION;

/// Well-known role names.
pub mod roles {
    pub use crate::model::metadata::{KEY_MGR_ROLE, ROOT_ROLE};
}

/// Convenience re-exports.
pub mod prelude {
    pub use crate::config::{EngineConfig, LimitsConfig, SignerConfig};
    pub use crate::determinism::canonical_json::{canonicalize, canonicalize_json};
    pub use crate::keys::{Fingerprint, PrivateKey, PublicKey, SignatureBytes};
    pub use crate::model::{Delegation, Delegations, Envelope, Payload, RootMetadata, SignatureRecord};
    pub use crate::signing::{
        serialize_and_sign, sign, sign_with, wrap, wrap_json, wrap_serialize, GpgSigner, KeySigner,
        Signer,
    };
    pub use crate::verify::{verify_delegation, verify_root, verify_root_chain};
    pub use crate::{MetatrustError, MetatrustResult};
}
