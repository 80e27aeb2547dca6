//! metatrust data models.
//!
//! - [`payload`]: the closed set of signable values.
//! - [`envelope`]: `{signatures, signed}` wrappers around a payload.
//! - [`metadata`]: typed views of delegating and root metadata, plus builders.
//!
//! Models are mostly "dumb" data. Canonical bytes come from
//! `crate::determinism::canonical_json`, never from default serde formatting.

pub mod envelope;
pub mod metadata;
pub mod payload;

pub use envelope::{Envelope, SignatureRecord};
pub use metadata::{Delegation, Delegations, RootMetadata};
pub use payload::{to_payload, Payload};
