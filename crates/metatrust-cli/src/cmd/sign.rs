use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use metatrust_core::config::EngineConfig;
use metatrust_core::keys::PrivateKey;
use metatrust_core::model::Payload;
use metatrust_core::signing::repodata::{sign_all_in_repodata, SIGNATURES};
use metatrust_core::signing::sign;
use serde::Serialize;

use crate::io::{export, input};
use crate::output;

#[derive(Debug, Serialize)]
pub struct SignOut {
    pub ok: bool,
    pub file: String,
    pub pubkey: String,
    pub signatures: usize,
}

fn private_key(hex_text: &str) -> Result<PrivateKey> {
    PrivateKey::from_hex(hex_text).context("expected a 64-hex-character ed25519 private key")
}

pub fn artifacts(cfg: &EngineConfig, repodata: &Path, private_key_hex: &str) -> Result<ExitCode> {
    let key = private_key(private_key_hex)?;
    let index = input::read_payload(repodata, &cfg.limits)?;
    let signed = sign_all_in_repodata(&index, &key)?;
    export::write_payload(repodata, &signed, &cfg.limits)?;

    let count = signed
        .get(SIGNATURES)
        .and_then(Payload::as_object)
        .map_or(0, |m| m.len());
    let out = SignOut {
        ok: true,
        file: repodata.display().to_string(),
        pubkey: key.public_key().to_hex(),
        signatures: count,
    };
    output::print(
        &out,
        &format!("Signed {count} artifact(s) in {}.", out.file),
    )?;
    Ok(ExitCode::SUCCESS)
}

pub fn metadata(cfg: &EngineConfig, filename: &Path, private_key_hex: &str) -> Result<ExitCode> {
    let key = private_key(private_key_hex)?;
    let mut env = input::read_envelope(filename, &cfg.limits)?;
    sign(&mut env, &key)?;
    export::write_envelope(filename, &env, &cfg.limits)?;

    let out = SignOut {
        ok: true,
        file: filename.display().to_string(),
        pubkey: key.public_key().to_hex(),
        signatures: env.signature_count(),
    };
    output::print(
        &out,
        &format!("Signed {} with key {}.", out.file, out.pubkey),
    )?;
    Ok(ExitCode::SUCCESS)
}
