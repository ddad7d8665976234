//! Bounded polling waiters
//!
//! - `readiness` - wait until every target service is registered
//! - `health` - wait until every health check of the registered services passes
//!
//! Both are plain loops over an explicit retry counter: the first attempt is
//! free, each further attempt costs one retry, and a zero budget means exactly
//! one attempt with no sleep.

pub mod health;
pub mod readiness;

pub use health::{partition_checks, wait_for_health, HealthReport, HealthSummary};
pub use readiness::{wait_for_membership, Membership};

use crate::catalog::CatalogError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Retry budget and the fixed pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first one
    pub retries: u32,
    /// Sleep between attempts
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self { retries, interval }
    }

    /// Upper bound on the number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Number the next attempt; pins at `u32::MAX` for an unbounded budget
pub(crate) fn next_attempt(attempt: u32) -> u32 {
    attempt.saturating_add(1)
}

/// Which services the health phase polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceScope {
    /// The registered set observed when membership succeeded, never refreshed
    #[default]
    Snapshot,
    /// Re-list the catalog at the start of every health attempt
    Refresh,
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error(
        "services still missing after {} attempts: {}",
        .attempts,
        join_names(.missing)
    )]
    MembershipTimeout {
        attempts: u32,
        missing: BTreeSet<String>,
    },

    #[error(
        "health checks still failing after {} attempts: {}",
        .attempts,
        join_names(.failing)
    )]
    HealthTimeout { attempts: u32, failing: Vec<String> },

    #[error("catalog query cannot succeed: {0}")]
    Catalog(#[source] CatalogError),
}

fn join_names<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let joined: Vec<&str> = names.into_iter().map(String::as_str).collect();
    if joined.is_empty() {
        "(none observed)".to_string()
    } else {
        joined.join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "waiter_test.rs"]
mod tests;
