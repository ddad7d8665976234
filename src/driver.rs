//! Gate driver: membership wait, then health wait, then a verdict
//!
//! ```text
//! START → AWAITING_MEMBERSHIP → AWAITING_HEALTH → SUCCEEDED
//!                 │                    │
//!                 └──────→ FAILED ←────┘
//! ```
//!
//! No transition re-enters an earlier phase. A failed membership wait never
//! starts the health wait.

use crate::catalog::{build_http_client, Catalog, CatalogError, ConsulCatalog, TransportError};
use crate::config::Config;
use crate::metrics::{GateMetrics, PHASE_HEALTH, PHASE_MEMBERSHIP};
use crate::target::{resolve_prefix, TargetError, TargetServiceSet};
use crate::waiter::{
    wait_for_health, wait_for_membership, HealthSummary, Membership, RetryPolicy, ServiceScope,
    WaitError,
};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that stop the gate before any waiting starts
#[derive(Debug, Error)]
pub enum GateError {
    #[error("failed to resolve deployment prefix: {0}")]
    Target(#[from] TargetError),

    #[error("failed to set up catalog transport: {0}")]
    Transport(#[from] TransportError),

    #[error("catalog is unreachable: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to create metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    AwaitingMembership,
    AwaitingHealth,
    Succeeded,
    Failed,
}

impl Phase {
    /// Whether `self → next` is an edge of the gate state machine
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Start, Phase::AwaitingMembership)
                | (Phase::AwaitingMembership, Phase::AwaitingHealth)
                | (Phase::AwaitingMembership, Phase::Failed)
                | (Phase::AwaitingHealth, Phase::Succeeded)
                | (Phase::AwaitingHealth, Phase::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

/// Current phase of one run, only moved along legal edges
#[derive(Debug)]
struct PhaseTracker {
    phase: Phase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self { phase: Phase::Start }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal gate transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(from = ?self.phase, to = ?next, "Gate phase transition");
        self.phase = next;
    }
}

/// What to wait for and how long
#[derive(Debug, Clone)]
pub struct GatePlan {
    pub targets: TargetServiceSet,
    pub readiness: RetryPolicy,
    pub health: RetryPolicy,
    pub scope: ServiceScope,
}

/// Final verdict of a gate run
#[derive(Debug)]
pub enum Outcome {
    Succeeded {
        membership: Membership,
        health: HealthSummary,
    },
    Failed {
        /// Phase the gate was in when it gave up
        failed_in: Phase,
        error: WaitError,
    },
}

impl Outcome {
    /// Process exit status: `0` on success, `1` on any failure
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Succeeded { .. } => 0,
            Outcome::Failed { .. } => 1,
        }
    }

    pub fn final_phase(&self) -> Phase {
        match self {
            Outcome::Succeeded { .. } => Phase::Succeeded,
            Outcome::Failed { .. } => Phase::Failed,
        }
    }
}

/// Run both waits in order against `catalog`
///
/// Reports the verdict exactly once: a success message, or a failure message
/// carrying what was still missing or failing.
pub async fn run<C: Catalog + ?Sized>(
    catalog: &C,
    plan: &GatePlan,
    metrics: &GateMetrics,
) -> Outcome {
    let mut tracker = PhaseTracker::new();

    tracker.advance(Phase::AwaitingMembership);
    info!(
        targets = plan.targets.len(),
        retries = plan.readiness.retries,
        "Waiting for target services to register"
    );
    let started = Instant::now();
    let membership = wait_for_membership(catalog, &plan.targets, plan.readiness, metrics).await;
    metrics.observe_phase_duration(PHASE_MEMBERSHIP, started.elapsed().as_secs_f64());

    let membership = match membership {
        Ok(membership) => membership,
        Err(error) => {
            tracker.advance(Phase::Failed);
            error!(error = %error, "Failed to wait for services");
            return Outcome::Failed {
                failed_in: Phase::AwaitingMembership,
                error,
            };
        }
    };

    tracker.advance(Phase::AwaitingHealth);
    info!(
        services = membership.registered.len(),
        scope = ?plan.scope,
        retries = plan.health.retries,
        "All services found, checking health check statuses"
    );
    let started = Instant::now();
    let health = wait_for_health(
        catalog,
        &membership.registered,
        plan.scope,
        plan.health,
        metrics,
    )
    .await;
    metrics.observe_phase_duration(PHASE_HEALTH, started.elapsed().as_secs_f64());

    match health {
        Ok(health) => {
            tracker.advance(Phase::Succeeded);
            info!(
                membership_attempts = membership.attempts,
                health_attempts = health.attempts,
                "Service check succeeded"
            );
            Outcome::Succeeded { membership, health }
        }
        Err(error) => {
            tracker.advance(Phase::Failed);
            error!(error = %error, "Service check failed");
            Outcome::Failed {
                failed_in: Phase::AwaitingHealth,
                error,
            }
        }
    }
}

/// Set up everything `config` describes, then run the gate
///
/// Configuration problems (unreadable prefix file, bad TLS material, a
/// catalog host that does not resolve) come back as `Err` before any retry
/// loop starts.
pub async fn execute(config: &Config) -> Result<Outcome, GateError> {
    let prefix = resolve_prefix(&config.prefix)?;
    let targets =
        TargetServiceSet::with_prefix(&prefix, &config.services, &config.global_services);
    info!(
        prefix = %prefix,
        targets = ?targets.names(),
        "Resolved target services"
    );
    if targets.is_empty() {
        warn!("No target services configured, membership is trivially satisfied");
    }

    let client = build_http_client(&config.transport, config.query_timeout)?;
    let catalog = ConsulCatalog::new(client, config.catalog_url.clone());
    catalog.resolve_host(config.query_timeout).await?;
    info!(catalog = %catalog.base_url(), "Catalog configured");

    let metrics = GateMetrics::new()?;
    let plan = GatePlan {
        targets,
        readiness: config.readiness,
        health: config.health,
        scope: config.service_scope,
    };

    let outcome = run(&catalog, &plan, &metrics).await;

    if let Some(path) = &config.metrics_file {
        match metrics.write_textfile(path) {
            Ok(()) => debug!(path = %path.display(), "Metrics written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write metrics file"),
        }
    }

    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "driver_test.rs"]
mod tests;
