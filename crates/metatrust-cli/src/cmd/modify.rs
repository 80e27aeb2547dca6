//! Interactive `modify-metadata`.
//!
//! The session starts the next version of a metadata file, lets the user
//! apply edits and signatures from a numbered menu, and shows after every
//! step what changed and which signatures are still needed. All edits go
//! through `metatrust_core::edit`, so this module only deals with prompts.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Result};
use metatrust_core::config::{EngineConfig, LimitsConfig, SignerConfig};
use metatrust_core::determinism::canonical_json::canonical_string;
use metatrust_core::determinism::normalize_hex::{normalize_hex, strip_and_lowercase};
use metatrust_core::edit::{propose, EditOp, Proposal};
use metatrust_core::keys::{is_gpg_fingerprint, is_hex_key, PrivateKey, PUBLIC_KEY_HEX_LEN};
use metatrust_core::model::metadata::metadata_type;
use metatrust_core::model::{Delegation, Envelope, Payload};
use metatrust_core::signing::{sign, sign_with, GpgSigner};
use metatrust_core::MetatrustResult;
use termcolor::{Color, WriteColor};
use time::OffsetDateTime;

use crate::io::{export, input};
use crate::output::{self, colored};

const MENU: [&str; 10] = [
    "Done: write and save metadata",
    "Abort: discard changes and exit without writing",
    "Add a signature (sign with a key you have)",
    "Remove a signature",
    "Set or remove a top-level field",
    "Add a delegation",
    "Remove a delegation",
    "Change the threshold number of keys for a delegation",
    "Add an authorized key to a delegation",
    "Remove an authorized key from a delegation",
];

pub fn run(cfg: &EngineConfig, filename: &Path) -> Result<ExitCode> {
    if output::is_json() {
        bail!("modify-metadata is interactive and does not support --json");
    }
    let original = input::read_envelope(filename, &cfg.limits)?;
    let mut session = Session::start(original, OffsetDateTime::now_utc(), cfg.clone())?;

    let stdin = std::io::stdin();
    let mut out = output::stdout();
    session.run(&mut stdin.lock(), &mut out, filename)?;
    Ok(ExitCode::SUCCESS)
}

enum Step {
    Continue,
    Done,
}

struct Session {
    original: Envelope,
    now: OffsetDateTime,
    ops: Vec<EditOp>,
    proposal: Proposal,
    /// The proposal's envelope plus any signatures added so far.
    working: Envelope,
    signer: SignerConfig,
    limits: LimitsConfig,
}

impl Session {
    fn start(original: Envelope, now: OffsetDateTime, cfg: EngineConfig) -> Result<Self> {
        let proposal = propose(&original, &[], now)?;
        let working = proposal.envelope.clone();
        Ok(Self {
            original,
            now,
            ops: Vec::new(),
            proposal,
            working,
            signer: cfg.signer,
            limits: cfg.limits,
        })
    }

    /// Rebuild the proposal with one more operation. Signatures made so far
    /// no longer cover the content and are dropped.
    fn edit(&mut self, op: EditOp) -> MetatrustResult<()> {
        let mut ops = self.ops.clone();
        ops.push(op);
        let proposal = propose(&self.original, &ops, self.now)?;

        let dropped = self.working.signature_count();
        if dropped > 0 {
            tracing::warn!(dropped, "metadata changed; existing signatures were discarded");
        }
        self.ops = ops;
        self.working = proposal.envelope.clone();
        self.proposal = proposal;
        Ok(())
    }

    fn run<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W, source: &Path) -> Result<()> {
        loop {
            self.show(out)?;

            writeln!(out, "\n--- Please choose an operation by entering its number")?;
            for (i, label) in MENU.iter().enumerate() {
                writeln!(out, "    {i}: {label}")?;
            }

            let choice = ask(input, out, "your choice")?;
            let step = match choice.parse::<usize>() {
                Ok(0) => self.write(input, out, source)?,
                Ok(1) => {
                    colored(out, Color::Red, "\nAborting!\n")?;
                    writeln!(out)?;
                    Step::Done
                }
                Ok(2) => self.add_signature(input, out)?,
                Ok(3) => self.remove_signature(input, out)?,
                Ok(4) => self.update_field(input, out)?,
                Ok(5) => self.add_delegation(input, out)?,
                Ok(6) => {
                    let role = ask(input, out, "the name of the delegation to remove")?;
                    self.apply(out, EditOp::RemoveDelegation { role })?
                }
                Ok(7) => self.set_threshold(input, out)?,
                Ok(8) => {
                    let role = ask(input, out, "a delegation name")?;
                    let pubkey = ask(input, out, "the 64-hex-character public key to add")?;
                    self.apply(out, EditOp::AddKey { role, pubkey })?
                }
                Ok(9) => {
                    let role = ask(input, out, "a delegation name")?;
                    let pubkey = ask(input, out, "the 64-hex-character public key to remove")?;
                    self.apply(out, EditOp::RemoveKey { role, pubkey })?
                }
                _ => failure(out, "Invalid entry. Try again.")?,
            };

            if let Step::Done = step {
                return Ok(());
            }
        }
    }

    fn show<W: WriteColor>(&self, out: &mut W) -> Result<()> {
        colored(out, Color::Cyan, "\n--- Current metadata:\n")?;
        writeln!(out, "{}", canonical_string(&self.working.to_payload())?)?;

        colored(out, Color::Cyan, "\n--- Changes from the original:\n")?;
        for change in &self.proposal.changes {
            writeln!(out, "    {change}")?;
        }

        colored(out, Color::Cyan, "\n--- Required signatures:\n")?;
        for req in &self.proposal.required {
            let report = req.status(&self.working, &self.limits)?;
            let color = if report.meets_threshold() { Color::Green } else { Color::Yellow };
            write!(out, "    {}: ", req.source.as_str())?;
            colored(out, color, &format!("{} of {}", report.valid_count(), req.threshold))?;
            writeln!(out, " signed")?;
            for key in report.missing_keys(&req.pubkeys) {
                writeln!(out, "        missing {key}")?;
            }
        }
        Ok(())
    }

    fn apply<W: WriteColor>(&mut self, out: &mut W, op: EditOp) -> Result<Step> {
        match self.edit(op) {
            Ok(()) => notice(out, "Metadata updated."),
            Err(e) => failure(out, &e.to_string()),
        }
    }

    fn write<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W, source: &Path) -> Result<Step> {
        let default = default_path(source, self.working.signed());
        let answer = ask(
            input,
            out,
            &format!("a filename to save this metadata as (empty for {})", default.display()),
        )?;
        let path = if answer.is_empty() { default } else { PathBuf::from(answer) };

        if path.exists() {
            let confirm = ask(input, out, &format!("confirmation to overwrite {} [y/N]", path.display()))?;
            if !confirm.eq_ignore_ascii_case("y") {
                return notice(out, "Not written.");
            }
        }

        export::write_envelope(&path, &self.working, &self.limits)?;
        notice(out, &format!("Modified metadata written to {}.", path.display()))?;
        Ok(Step::Done)
    }

    fn add_signature<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W) -> Result<Step> {
        let key = strip_and_lowercase(&ask(
            input,
            out,
            "a key: either a 40-hex-character GPG key fingerprint, or a \
             64-hex-character private key",
        )?);

        if is_hex_key(&key) {
            let private = PrivateKey::from_hex(&key)?;
            sign(&mut self.working, &private)?;
            notice(out, "Successfully signed! Please save.")
        } else if is_gpg_fingerprint(&key) {
            let signed = GpgSigner::new(&key, self.signer.clone())
                .and_then(|s| sign_with(&mut self.working, &s));
            match signed {
                Ok(()) => notice(out, "Successfully signed! Please save."),
                Err(e) => failure(
                    out,
                    &format!("Signing FAILED. Do you have this key loaded in GPG on this system? ({e})"),
                ),
            }
        } else {
            failure(out, "Unable to recognize key. Please try again.")
        }
    }

    fn remove_signature<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W) -> Result<Step> {
        let answer = ask(input, out, "the public key whose signature should be removed")?;
        let pubkey = match normalize_hex(&answer, PUBLIC_KEY_HEX_LEN, "public key") {
            Ok(k) => k,
            Err(e) => return failure(out, &e.to_string()),
        };
        if self.working.remove_signature(&pubkey) {
            notice(out, "Signature removed.")
        } else {
            failure(out, "No signature by that key.")
        }
    }

    fn update_field<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W) -> Result<Step> {
        let field = ask(input, out, "the name of a top-level field")?;
        let raw = ask(input, out, "a JSON value for it (empty to remove the field)")?;
        if raw.is_empty() {
            return self.apply(out, EditOp::RemoveField { field });
        }
        let parsed = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(v) => v,
            Err(e) => return failure(out, &format!("Not valid JSON: {e}")),
        };
        match Payload::try_from(parsed) {
            Ok(value) => self.apply(out, EditOp::SetField { field, value }),
            Err(e) => failure(out, &e.to_string()),
        }
    }

    fn add_delegation<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W) -> Result<Step> {
        let role = ask(input, out, "a name for the new delegation")?;
        let keys = ask(input, out, "its public keys, separated by spaces or commas")?;
        let threshold = ask(input, out, "its threshold")?;

        let Ok(threshold) = threshold.parse::<u64>() else {
            return failure(out, "Invalid value. Expecting an integer greater than or equal to 1.");
        };
        let keys = keys.split(|c: char| c == ',' || c.is_whitespace()).filter(|k| !k.is_empty());
        match Delegation::new(keys, threshold) {
            Ok(delegation) => self.apply(out, EditOp::AddDelegation { role, delegation }),
            Err(e) => failure(out, &e.to_string()),
        }
    }

    fn set_threshold<R: BufRead, W: WriteColor>(&mut self, input: &mut R, out: &mut W) -> Result<Step> {
        let role = ask(input, out, "a delegation name")?;
        let threshold = ask(input, out, "a new threshold value")?;
        match threshold.parse::<u64>() {
            Ok(threshold) if threshold >= 1 => self.apply(out, EditOp::SetThreshold { role, threshold }),
            _ => failure(out, "Invalid value. Expecting an integer greater than or equal to 1."),
        }
    }
}

/// `<version>.<type>.json` next to the source file.
fn default_path(source: &Path, signed: &Payload) -> PathBuf {
    let kind = metadata_type(signed).unwrap_or("metadata");
    let name = match signed.get("version").and_then(Payload::as_i128) {
        Some(v) => format!("{v}.{kind}.json"),
        None => format!("{kind}.json"),
    };
    source.with_file_name(name)
}

/// Prompt for one line of input. End of input is an error: nothing is written.
fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, what: &str) -> Result<String> {
    write!(out, "\n----- Please provide {what}: ")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(anyhow!("input closed; nothing was written"));
    }
    Ok(line.trim().to_string())
}

fn notice<W: WriteColor>(out: &mut W, msg: &str) -> Result<Step> {
    colored(out, Color::Green, &format!("\n--- {msg}"))?;
    writeln!(out)?;
    Ok(Step::Continue)
}

fn failure<W: WriteColor>(out: &mut W, msg: &str) -> Result<Step> {
    colored(out, Color::Red, &format!("\n--- {msg}"))?;
    writeln!(out)?;
    Ok(Step::Continue)
}
