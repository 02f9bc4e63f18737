//! Boolean signal sources driving condition values
//!
//! A probe answers one question per call: is the condition currently true?
//! Each worker owns exactly one probe and evaluates it serially on its
//! polling interval. Probe selection happens once, at worker construction,
//! based on which source the PodCondition spec configures.

mod prometheus;

pub use prometheus::PrometheusProbe;

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::crd::PodConditionSpec;
use crate::Error;

/// A source of truth for the current value of a condition
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Probe: Send + Sync {
    /// Evaluate the signal and return the current verdict
    ///
    /// On error the returned verdict must not be trusted; callers decide
    /// whether to retry or give up.
    async fn evaluate(&self) -> Result<bool, Error>;
}

/// Probe returning a fixed verdict, always successfully
///
/// Useful in tests and for wiring a condition that is flipped by hand.
#[derive(Clone, Copy, Debug)]
pub struct StaticProbe {
    verdict: bool,
}

impl StaticProbe {
    /// Create a probe that always answers with `verdict`
    pub fn new(verdict: bool) -> Self {
        Self { verdict }
    }
}

#[async_trait]
impl Probe for StaticProbe {
    async fn evaluate(&self) -> Result<bool, Error> {
        Ok(self.verdict)
    }
}

/// Select and construct the probe configured in a PodCondition spec
///
/// The spec's source config is a tagged union: exactly one concrete source
/// may be present. A spec with no source at all cannot drive a condition
/// and is rejected here, before any worker loop exists.
pub fn resolve_probe(spec: &PodConditionSpec) -> Result<Arc<dyn Probe>, Error> {
    if let Some(ref source) = spec.prometheus_source {
        return Ok(Arc::new(PrometheusProbe::new(
            &source.server_url,
            &source.rule,
        )?));
    }

    Err(Error::validation("no signal source configured"))
}
