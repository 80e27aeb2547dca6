//! Verification of signed metadata.
//!
//! - [`delegation`]: threshold verification of one role's metadata against
//!   an already-trusted delegating envelope.
//! - [`root`]: root rotation (`N` -> `N+1`) and chain walking.
//!
//! This module performs no I/O and never mutates its inputs. Rejections are
//! errors; the reports returned on success carry per-entry findings for
//! display.

pub mod delegation;
pub mod root;

use std::collections::BTreeMap;

pub use delegation::{verify_delegation, verify_delegation_with_limits, DelegationReport};
pub use root::{verify_root, verify_root_chain, verify_root_with_limits, RootChainReport, RootReport};

/// A structured verification finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyFinding {
    pub level: VerifyLevel,
    pub code: String,
    pub message: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyLevel {
    Info,
    Warning,
}

impl VerifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

fn push(
    findings: &mut Vec<VerifyFinding>,
    level: VerifyLevel,
    code: impl Into<String>,
    message: impl Into<String>,
    pubkey: Option<&str>,
) {
    let mut data = BTreeMap::new();
    if let Some(k) = pubkey {
        data.insert("pubkey".to_string(), k.to_string());
    }
    findings.push(VerifyFinding {
        level,
        code: code.into(),
        message: message.into(),
        data,
    });
}
