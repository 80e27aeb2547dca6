use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use metatrust_core::config::EngineConfig;
use metatrust_core::signing::{sign_with, GpgSigner};
use serde::Serialize;

use crate::io::{export, input};
use crate::output;

#[derive(Debug, Serialize)]
pub struct LookupOut {
    pub fingerprint: String,
    pub pubkey: String,
}

fn signer(cfg: &EngineConfig, fingerprint: &str) -> Result<GpgSigner> {
    GpgSigner::new(fingerprint, cfg.signer.clone())
        .with_context(|| format!("cannot use OpenPGP key {fingerprint}"))
}

pub fn lookup(cfg: &EngineConfig, fingerprint: &str) -> Result<ExitCode> {
    let signer = signer(cfg, fingerprint)?;
    let out = LookupOut {
        fingerprint: signer.fingerprint().to_string(),
        pubkey: signer.public_key().to_hex(),
    };
    output::print(&out, &format!("Underlying ed25519 key value: {}", out.pubkey))?;
    Ok(ExitCode::SUCCESS)
}

pub fn sign(cfg: &EngineConfig, fingerprint: &str, filename: &Path) -> Result<ExitCode> {
    let signer = signer(cfg, fingerprint)?;
    let mut env = input::read_envelope(filename, &cfg.limits)?;
    sign_with(&mut env, &signer)?;
    export::write_envelope(filename, &env, &cfg.limits)?;

    let out = LookupOut {
        fingerprint: signer.fingerprint().to_string(),
        pubkey: signer.public_key().to_hex(),
    };
    output::print(
        &out,
        &format!("Signed {} with OpenPGP key {}.", filename.display(), out.fingerprint),
    )?;
    Ok(ExitCode::SUCCESS)
}
