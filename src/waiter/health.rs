//! Health wait: block until no check of the polled services is failing

use super::{next_attempt, RetryPolicy, ServiceScope, WaitError};
use crate::catalog::{Catalog, CatalogError, HealthCheckResult};
use crate::metrics::{GateMetrics, PHASE_HEALTH, RESULT_ERROR, RESULT_SATISFIED, RESULT_UNMET};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Check names split by outcome
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthReport {
    pub passing: Vec<String>,
    pub failing: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.failing.is_empty()
    }
}

/// Result of a successful health wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Services polled on the successful attempt
    pub services: usize,
    /// Checks seen on the successful attempt, all passing
    pub checks: usize,
}

/// Split flattened check results into passing and failing names
pub fn partition_checks<I>(results: I) -> HealthReport
where
    I: IntoIterator<Item = HealthCheckResult>,
{
    let mut report = HealthReport::default();
    for check in results {
        if check.passing {
            report.passing.push(check.name);
        } else {
            report.failing.push(check.name);
        }
    }
    report
}

/// One health attempt: the services polled and what their checks said
async fn poll_checks<C: Catalog + ?Sized>(
    catalog: &C,
    snapshot: &BTreeSet<String>,
    scope: ServiceScope,
) -> Result<(usize, HealthReport), CatalogError> {
    let refreshed;
    let services = match scope {
        ServiceScope::Snapshot => snapshot,
        ServiceScope::Refresh => {
            refreshed = catalog.list_services().await?;
            &refreshed
        }
    };

    let mut results = Vec::new();
    for service in services {
        results.extend(catalog.list_health_checks(service).await?);
    }
    Ok((services.len(), partition_checks(results)))
}

/// Poll health checks until none is failing
///
/// With [`ServiceScope::Snapshot`] the services polled are exactly
/// `snapshot`, the registered set from the membership phase. With
/// [`ServiceScope::Refresh`] the catalog is listed again on every attempt.
pub async fn wait_for_health<C: Catalog + ?Sized>(
    catalog: &C,
    snapshot: &BTreeSet<String>,
    scope: ServiceScope,
    policy: RetryPolicy,
    metrics: &GateMetrics,
) -> Result<HealthSummary, WaitError> {
    let mut retries_left = policy.retries;
    let mut attempt: u32 = 0;
    let mut failing = Vec::new();

    loop {
        attempt = next_attempt(attempt);

        match poll_checks(catalog, snapshot, scope).await {
            Ok((services, report)) => {
                metrics.set_failing_checks(report.failing.len());

                if report.is_healthy() {
                    metrics.record_attempt(PHASE_HEALTH, RESULT_SATISFIED);
                    info!(
                        attempt,
                        services,
                        checks = report.passing.len(),
                        "There are no failing checks"
                    );
                    return Ok(HealthSummary {
                        attempts: attempt,
                        services,
                        checks: report.passing.len(),
                    });
                }

                metrics.record_attempt(PHASE_HEALTH, RESULT_UNMET);
                info!(
                    attempt,
                    passing = ?report.passing,
                    failing = ?report.failing,
                    "Waiting for health checks to pass"
                );
                failing = report.failing;
            }
            Err(e) if !e.is_retryable() => return Err(WaitError::Catalog(e)),
            Err(e) => {
                metrics.record_attempt(PHASE_HEALTH, RESULT_ERROR);
                warn!(attempt, error = %e, "Health query failed, counting attempt as a miss");
            }
        }

        if retries_left == 0 {
            return Err(WaitError::HealthTimeout {
                attempts: attempt,
                failing,
            });
        }

        retries_left -= 1;
        info!(retries_left, interval = ?policy.interval, "Retrying health check");
        tokio::time::sleep(policy.interval).await;
    }
}
