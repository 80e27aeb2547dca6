use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use metatrust_core::config::EngineConfig;
use metatrust_core::roles::ROOT_ROLE;
use metatrust_core::verify::{
    verify_delegation_with_limits, verify_root_with_limits, DelegationReport, VerifyLevel,
};
use metatrust_core::MetatrustError;
use serde::Serialize;

use crate::io::input;
use crate::output;

/// Exit code when a root rotation does not verify.
pub const EXIT_ROOT_FAILURE: u8 = 10;
/// Exit code when delegated metadata does not verify.
pub const EXIT_DELEGATION_FAILURE: u8 = 20;

#[derive(Debug, Serialize)]
pub struct VerifyOut {
    pub ok: bool,
    pub metadata_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorOut>,
}

#[derive(Debug, Serialize)]
pub struct CheckOut {
    pub name: &'static str,
    pub valid: usize,
    pub threshold: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub code: &'static str,
    pub message: String,
}

fn check(name: &'static str, report: &DelegationReport) -> CheckOut {
    CheckOut {
        name,
        valid: report.valid_count(),
        threshold: report.threshold,
        warnings: report
            .findings
            .iter()
            .filter(|f| f.level == VerifyLevel::Warning)
            .map(|f| f.message.clone())
            .collect(),
    }
}

pub fn run(cfg: &EngineConfig, trusted: &Path, untrusted: &Path) -> Result<ExitCode> {
    let trusted = input::read_envelope(trusted, &cfg.limits)?;
    let untrusted = input::read_envelope(untrusted, &cfg.limits)?;
    let metadata_type = untrusted
        .metadata_type()
        .context("untrusted metadata does not declare a type")?
        .to_string();

    let (outcome, failure_code, success_text) = if metadata_type == ROOT_ROLE {
        (
            verify_root_with_limits(&trusted, &untrusted, &cfg.limits).map(|r| {
                vec![
                    check("continuity", &r.continuity),
                    check("self-consistency", &r.self_consistency),
                ]
            }),
            EXIT_ROOT_FAILURE,
            "Root metadata verification successful.",
        )
    } else {
        (
            verify_delegation_with_limits(&metadata_type, &untrusted, &trusted, &cfg.limits)
                .map(|r| vec![check("delegation", &r)]),
            EXIT_DELEGATION_FAILURE,
            "Metadata verification successful.",
        )
    };

    match outcome {
        Ok(checks) => {
            let out = VerifyOut {
                ok: true,
                metadata_type,
                checks,
                error: None,
            };
            output::print(&out, success_text)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_failure(metadata_type, &e)?;
            Ok(ExitCode::from(failure_code))
        }
    }
}

fn report_failure(metadata_type: String, e: &MetatrustError) -> Result<()> {
    let human = format!(
        "Verification of untrusted metadata failed.  Metadata type was \"{metadata_type}\".  \
         Error reads:\n  \"{e}\""
    );
    let out = VerifyOut {
        ok: false,
        metadata_type,
        checks: Vec::new(),
        error: Some(ErrorOut {
            code: e.code(),
            message: e.to_string(),
        }),
    };
    output::print(&out, &human)
}
