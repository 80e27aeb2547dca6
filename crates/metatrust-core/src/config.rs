//! Configuration structures for metatrust-core.
//!
//! The core crate itself does not read environment variables or files. All
//! configuration must be provided explicitly by the caller (the CLI maps its
//! flags and environment onto these structures).

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{MetatrustError, MetatrustResult};

/// Global configuration container.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub signer: SignerConfig,
}

/// Resource and complexity limits for untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Maximum size of a JSON document accepted by `crate::parse`.
    pub max_json_bytes: usize,
    /// Maximum nesting depth of a payload.
    pub max_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_json_bytes: 256 * 1024 * 1024,
            max_depth: 128,
        }
    }
}

/// Settings for the external OpenPGP signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerConfig {
    /// Program invoked for OpenPGP operations.
    pub gpg_program: PathBuf,
    /// Upper bound on a single gpg invocation (hardware keys may wait for a touch).
    pub timeout: Duration,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            gpg_program: PathBuf::from("gpg"),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Validate a full configuration object.
pub fn validate_config(cfg: &EngineConfig) -> MetatrustResult<()> {
    if cfg.limits.max_json_bytes == 0 {
        return Err(MetatrustError::format(
            "max_json_bytes must be greater than zero",
        ));
    }

    if cfg.limits.max_depth == 0 {
        return Err(MetatrustError::format("max_depth must be greater than zero"));
    }

    if cfg.signer.gpg_program.as_os_str().is_empty() {
        return Err(MetatrustError::format("gpg_program must not be empty"));
    }

    if cfg.signer.timeout.is_zero() {
        return Err(MetatrustError::format(
            "signer timeout must be greater than zero",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = EngineConfig::default();
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn zero_depth_detected() {
        let mut cfg = EngineConfig::default();
        cfg.limits.max_depth = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn empty_program_detected() {
        let mut cfg = EngineConfig::default();
        cfg.signer.gpg_program = PathBuf::new();
        assert!(validate_config(&cfg).is_err());
    }
}
