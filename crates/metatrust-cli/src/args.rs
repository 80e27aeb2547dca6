use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "metatrust",
    version,
    about = "Signing and verification tools for repository trust metadata"
)]
pub struct Cli {
    /// Emit JSON output on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// A set of one or more comma-separated directives to filter logs.
    ///
    /// The general format is "target_name[span_name{field=value}]=level" where level is
    /// one of TRACE, DEBUG, INFO, WARN, ERROR.
    #[arg(
        long,
        global = true,
        env = "METATRUST_LOG",
        default_value = "warn,metatrust=info"
    )]
    pub log_filter: String,

    /// Program used for OpenPGP signing and key lookup.
    #[arg(long, global = true, env = "METATRUST_GPG", default_value = "gpg")]
    pub gpg_program: PathBuf,

    /// Give up on a gpg invocation after this many seconds.
    #[arg(long, global = true, default_value_t = 120)]
    pub gpg_timeout_secs: u64,

    /// Refuse JSON input files larger than this.
    #[arg(long, global = true, default_value_t = 256 * 1024 * 1024)]
    pub max_json_bytes: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign the metadata of every artifact listed in a repodata.json file and
    /// write the signatures back into that file.
    SignArtifacts {
        /// repodata.json file to sign in place.
        repodata: PathBuf,
        /// 64-hex-character ed25519 private key.
        private_key_hex: String,
    },

    /// Sign a metadata file (root.json, key_mgr.json, ...) in place with an
    /// ed25519 private key.
    SignMetadata {
        /// Metadata file to sign.
        filename: PathBuf,
        /// 64-hex-character ed25519 private key.
        private_key_hex: String,
    },

    /// Verify untrusted metadata against already-trusted metadata.
    ///
    /// Root metadata is verified as the next version of the trusted root
    /// (exit code 10 on failure). Any other metadata is verified against the
    /// trusted file's delegation for its type (exit code 20 on failure).
    VerifyMetadata {
        /// Already-trusted metadata that sets the rules.
        trusted: PathBuf,
        /// Metadata to verify.
        untrusted: PathBuf,
    },

    /// Interactively produce and sign the next version of a metadata file.
    ModifyMetadata {
        /// Existing metadata file to start from.
        filename: PathBuf,
    },

    /// Print the raw ed25519 public key behind an OpenPGP key fingerprint.
    GpgKeyLookup {
        /// 40-hex-character fingerprint, without a "0x" prefix. Whitespace is ignored.
        fingerprint: String,
    },

    /// Sign a metadata file in place using a gpg-managed key.
    GpgSign {
        /// 40-hex-character fingerprint, without a "0x" prefix. Whitespace is ignored.
        fingerprint: String,
        /// Metadata file to sign.
        filename: PathBuf,
    },
}
