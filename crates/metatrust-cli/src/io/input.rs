use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use metatrust_core::config::LimitsConfig;
use metatrust_core::model::{Envelope, Payload};
use metatrust_core::parse::{parse_envelope_bytes, parse_payload_bytes};

/// Read a whole file, refusing anything larger than `max_bytes`.
pub fn read_limited<P: AsRef<Path>>(path: P, max_bytes: usize) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;

    let mut buf = Vec::new();
    file.take(max_bytes as u64 + 1)
        .read_to_end(&mut buf)
        .with_context(|| format!("cannot read {}", path.display()))?;
    if buf.len() > max_bytes {
        return Err(anyhow!(
            "{} is larger than the {max_bytes}-byte limit",
            path.display()
        ));
    }
    Ok(buf)
}

/// Load a signed metadata file.
pub fn read_envelope<P: AsRef<Path>>(path: P, limits: &LimitsConfig) -> Result<Envelope> {
    let path = path.as_ref();
    let bytes = read_limited(path, limits.max_json_bytes)?;
    parse_envelope_bytes(&bytes, limits)
        .with_context(|| format!("{} is not valid signed metadata", path.display()))
}

/// Load an arbitrary JSON document (e.g. repodata.json).
pub fn read_payload<P: AsRef<Path>>(path: P, limits: &LimitsConfig) -> Result<Payload> {
    let path = path.as_ref();
    let bytes = read_limited(path, limits.max_json_bytes)?;
    parse_payload_bytes(&bytes, limits).with_context(|| format!("cannot load {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("big.json");
        std::fs::write(&p, b"[1, 2, 3]").unwrap();

        assert!(read_limited(&p, 9).is_ok());
        assert!(read_limited(&p, 8).is_err());
    }

    #[test]
    fn envelope_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("root.json");
        std::fs::write(&p, br#"{"signed": {}}"#).unwrap();

        let err = read_envelope(&p, &LimitsConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("root.json"));
    }
}
