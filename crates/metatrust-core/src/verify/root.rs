//! Root rotation.
//!
//! A candidate root `N+1` is accepted on top of a trusted root `N` only if:
//! - both are root metadata and the candidate's version is exactly `N+1`
//! - continuity: the candidate meets the threshold of the trusted root's
//!   `root` delegation
//! - self-consistency: the candidate meets the threshold of its own `root`
//!   delegation, so the new key set has actually signed off on itself

use crate::config::LimitsConfig;
use crate::errors::{ChainCheck, MetatrustError, MetatrustResult};
use crate::model::metadata::ROOT_ROLE;
use crate::model::{Envelope, RootMetadata};
use crate::verify::delegation::{verify_delegation_with_limits, DelegationReport};
use crate::version::require_successor;

/// Outcome of one rotation step.
#[derive(Debug, Clone)]
pub struct RootReport {
    pub trusted_version: i128,
    pub version: i128,
    pub continuity: DelegationReport,
    pub self_consistency: DelegationReport,
}

/// Verify `untrusted` as the successor of `trusted`.
pub fn verify_root(trusted: &Envelope, untrusted: &Envelope) -> MetatrustResult<RootReport> {
    verify_root_with_limits(trusted, untrusted, &LimitsConfig::default())
}

/// [`verify_root`], canonicalizing both delegation checks under `limits`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn verify_root_with_limits(
    trusted: &Envelope,
    untrusted: &Envelope,
    limits: &LimitsConfig,
) -> MetatrustResult<RootReport> {
    let current = RootMetadata::from_envelope(trusted)?;
    let candidate = RootMetadata::from_envelope(untrusted)?;

    require_successor(current.version, candidate.version)?;

    let continuity = verify_delegation_with_limits(ROOT_ROLE, untrusted, trusted, limits)
        .map_err(|e| MetatrustError::chain(ChainCheck::Continuity, e))?;
    let self_consistency = verify_delegation_with_limits(ROOT_ROLE, untrusted, untrusted, limits)
        .map_err(|e| MetatrustError::chain(ChainCheck::SelfConsistency, e))?;

    tracing::info!(
        from = %current.version,
        to = %candidate.version,
        "root rotation verified"
    );

    Ok(RootReport {
        trusted_version: current.version,
        version: candidate.version,
        continuity,
        self_consistency,
    })
}

/// Outcome of walking a sequence of rotations.
#[derive(Debug, Clone)]
pub struct RootChainReport {
    pub steps: Vec<RootReport>,
}

impl RootChainReport {
    /// Version of the newest root now trusted (`None` if no steps were taken).
    pub fn latest_version(&self) -> Option<i128> {
        self.steps.last().map(|s| s.version)
    }
}

/// Verify `candidates` in order, each against the one before it, starting
/// from `trusted`. Stops at the first failing step.
pub fn verify_root_chain(
    trusted: &Envelope,
    candidates: &[Envelope],
) -> MetatrustResult<RootChainReport> {
    let mut steps = Vec::with_capacity(candidates.len());
    let mut current = trusted;

    for candidate in candidates {
        let step = verify_root(current, candidate)?;
        steps.push(step);
        current = candidate;
    }

    Ok(RootChainReport { steps })
}
