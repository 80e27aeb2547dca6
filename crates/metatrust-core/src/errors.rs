//! Error types for metatrust-core.
//!
//! Every failure the engine reports falls into one [`ErrorKind`]. Kinds carry
//! stable string codes so that CLI and CI consumers can match on them without
//! parsing messages.
//!
//! Propagation rules:
//! - format and payload faults are raised at the boundary, before any
//!   canonicalization or cryptography happens
//! - a single bad signature entry never produces an error; it is excluded
//!   from the threshold tally instead
//! - verification never mutates its inputs, on success or failure

use std::fmt;

/// Result alias used throughout the crate.
pub type MetatrustResult<T> = Result<T, MetatrustError>;

/// Which of the two root-chain checks failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCheck {
    /// The candidate root is approved by the keys of the trusted root.
    Continuity,
    /// The candidate root is approved by the keys it designates itself.
    SelfConsistency,
}

impl ChainCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuity => "continuity",
            Self::SelfConsistency => "self-consistency",
        }
    }
}

impl fmt::Display for ChainCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error classification with stable codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    UnsupportedPayload,
    UnknownDelegation,
    RoleMismatch,
    InsufficientSignatures,
    VersionMismatch,
    ChainVerification,
    Serialization,
    Signer,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::UnsupportedPayload => "payload.unsupported",
            Self::UnknownDelegation => "delegation.unknown",
            Self::RoleMismatch => "role.mismatch",
            Self::InsufficientSignatures => "signatures.insufficient",
            Self::VersionMismatch => "version.mismatch",
            Self::ChainVerification => "chain.verification",
            Self::Serialization => "serialization",
            Self::Signer => "signer",
        }
    }
}

/// The crate error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MetatrustError {
    /// Malformed hex, wrong length, or a value of the wrong shape.
    #[error("format error: {0}")]
    Format(String),

    /// A value outside the closed set of payload kinds.
    #[error("unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// The trusted metadata does not delegate the requested role.
    #[error("unknown delegation: trusted metadata does not delegate role \"{role}\"")]
    UnknownDelegation { role: String },

    /// The untrusted metadata claims a different role than the one verified.
    #[error("role mismatch: expected metadata of type \"{expected}\", found \"{found}\"")]
    RoleMismatch { expected: String, found: String },

    /// Fewer distinct authorized keys produced valid signatures than required.
    #[error(
        "insufficient signatures for role \"{role}\": {valid} valid of {threshold} required"
    )]
    InsufficientSignatures {
        role: String,
        valid: usize,
        threshold: u64,
    },

    /// Root versions must increase by exactly one.
    #[error("version mismatch: trusted version is {trusted}, so expected {expected}, found {found}")]
    VersionMismatch {
        trusted: i128,
        expected: i128,
        found: i128,
    },

    /// One of the two root-chain checks failed.
    #[error("root chain verification failed ({check} check): {source}")]
    ChainVerification {
        check: ChainCheck,
        #[source]
        source: Box<MetatrustError>,
    },

    /// JSON text could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An external signer failed or is unavailable.
    #[error("signer error: {0}")]
    Signer(String),
}

impl MetatrustError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn unsupported_payload(msg: impl Into<String>) -> Self {
        Self::UnsupportedPayload(msg.into())
    }

    pub fn unknown_delegation(role: impl Into<String>) -> Self {
        Self::UnknownDelegation { role: role.into() }
    }

    pub fn role_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::RoleMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn signer(msg: impl Into<String>) -> Self {
        Self::Signer(msg.into())
    }

    pub fn chain(check: ChainCheck, source: MetatrustError) -> Self {
        Self::ChainVerification {
            check,
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) => ErrorKind::Format,
            Self::UnsupportedPayload(_) => ErrorKind::UnsupportedPayload,
            Self::UnknownDelegation { .. } => ErrorKind::UnknownDelegation,
            Self::RoleMismatch { .. } => ErrorKind::RoleMismatch,
            Self::InsufficientSignatures { .. } => ErrorKind::InsufficientSignatures,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::ChainVerification { .. } => ErrorKind::ChainVerification,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Signer(_) => ErrorKind::Signer,
        }
    }

    /// Stable error code, e.g. `"signatures.insufficient"`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

impl serde::ser::Error for MetatrustError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::UnsupportedPayload(msg.to_string())
    }
}

impl From<serde_json::Error> for MetatrustError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
