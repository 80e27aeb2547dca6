use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use metatrust_core::config::LimitsConfig;
use metatrust_core::determinism::canonical_json::canonicalize_with_limits;
use metatrust_core::model::{Envelope, Payload};

/// Write `env` in canonical form (the same bytes its signatures cover for `signed`).
///
/// Nothing is written if `env` exceeds `limits`.
pub fn write_envelope<P: AsRef<Path>>(path: P, env: &Envelope, limits: &LimitsConfig) -> Result<()> {
    let path = path.as_ref();
    let bytes = env.to_canonical_bytes_with_limits(limits)?;
    fs::write(path, bytes).with_context(|| format!("cannot write {}", path.display()))
}

pub fn write_payload<P: AsRef<Path>>(path: P, value: &Payload, limits: &LimitsConfig) -> Result<()> {
    let path = path.as_ref();
    let bytes = canonicalize_with_limits(value, limits)?;
    fs::write(path, bytes).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metatrust_core::signing::wrap_json;
    use serde_json::json;

    #[test]
    fn envelope_over_the_depth_limit_is_not_written() {
        let env = wrap_json(&json!({"type": "key_mgr", "version": 1, "delegations": {}})).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key_mgr.json");

        let shallow = LimitsConfig {
            max_depth: 1,
            ..LimitsConfig::default()
        };
        assert!(write_envelope(&path, &env, &shallow).is_err());
        assert!(!path.exists());

        write_envelope(&path, &env, &LimitsConfig::default()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), env.to_canonical_bytes().unwrap());
    }
}
