//! Ambiguity guard for single-target mutations
//!
//! PATCH, PUT, DELETE and `safepost` POST are meant to touch one entity. The
//! executor first probes the selection with a small cap; the guard then
//! decides whether the mutation may go ahead.
//!
//! The probe and the uncapped re-select that follows an `unsafe` verdict are
//! two separate store calls. A concurrent write between them can change the
//! matched set: this is a best-effort check, not an isolation guarantee.

use crate::config::MIN_AMBIGUITY_PROBE;
use crate::core::error::{QueryError, QueryResult};
use crate::core::Verb;

/// Outcome of the cardinality check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing matched
    NoMatch,
    /// Exactly one entity matched; the probe result is the target
    Single,
    /// Several matched under `unsafe`; re-select without the cap
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbiguityGuard {
    probe: usize,
}

impl AmbiguityGuard {
    pub fn new(probe: usize) -> Self {
        Self {
            probe: probe.max(MIN_AMBIGUITY_PROBE),
        }
    }

    /// Cap to select the probe with
    pub fn probe(&self) -> usize {
        self.probe
    }

    /// Judge a probe result of `matched` entities
    pub fn judge(
        &self,
        resource: &str,
        verb: Verb,
        matched: usize,
        unsafe_mode: bool,
    ) -> QueryResult<Verdict> {
        match matched {
            0 => {
                tracing::debug!(resource = %resource, verb = %verb, "no entity matched");
                Ok(Verdict::NoMatch)
            }
            1 => Ok(Verdict::Single),
            _ if unsafe_mode => {
                tracing::debug!(resource = %resource, verb = %verb, "unsafe mutation of several entities");
                Ok(Verdict::Multiple)
            }
            _ => {
                tracing::warn!(resource = %resource, verb = %verb, "ambiguous match rejected");
                Err(QueryError::AmbiguousMatch {
                    resource: resource.to_string(),
                    verb,
                })
            }
        }
    }
}

impl Default for AmbiguityGuard {
    fn default() -> Self {
        Self::new(MIN_AMBIGUITY_PROBE)
    }
}
