use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use metatrust_core::config::{validate_config, EngineConfig, LimitsConfig, SignerConfig};

use crate::args::{Cli, Command};

mod gpg;
mod modify;
mod sign;
mod verify;

/// Map global flags onto the engine configuration.
fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let cfg = EngineConfig {
        limits: LimitsConfig {
            max_json_bytes: cli.max_json_bytes,
            ..LimitsConfig::default()
        },
        signer: SignerConfig {
            gpg_program: cli.gpg_program.clone(),
            timeout: Duration::from_secs(cli.gpg_timeout_secs),
        },
    };
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn dispatch(cli: Cli) -> Result<ExitCode> {
    let cfg = engine_config(&cli)?;
    match cli.command {
        Command::SignArtifacts { repodata, private_key_hex } => {
            sign::artifacts(&cfg, &repodata, &private_key_hex)
        }
        Command::SignMetadata { filename, private_key_hex } => {
            sign::metadata(&cfg, &filename, &private_key_hex)
        }
        Command::VerifyMetadata { trusted, untrusted } => verify::run(&cfg, &trusted, &untrusted),
        Command::ModifyMetadata { filename } => modify::run(&cfg, &filename),
        Command::GpgKeyLookup { fingerprint } => gpg::lookup(&cfg, &fingerprint),
        Command::GpgSign { fingerprint, filename } => gpg::sign(&cfg, &fingerprint, &filename),
    }
}
