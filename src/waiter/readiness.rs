//! Membership wait: block until the target set is a subset of the catalog

use super::{next_attempt, RetryPolicy, WaitError};
use crate::catalog::Catalog;
use crate::metrics::{GateMetrics, PHASE_MEMBERSHIP, RESULT_ERROR, RESULT_SATISFIED, RESULT_UNMET};
use crate::target::TargetServiceSet;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Result of a successful membership wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Registered services at the moment every target was present
    pub registered: BTreeSet<String>,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Poll the catalog until every target service is registered
///
/// Each attempt compares a fresh catalog listing against the full target set;
/// nothing but the retry counter carries over between attempts. A failed
/// catalog query counts as a miss, unless it can never succeed.
pub async fn wait_for_membership<C: Catalog + ?Sized>(
    catalog: &C,
    targets: &TargetServiceSet,
    policy: RetryPolicy,
    metrics: &GateMetrics,
) -> Result<Membership, WaitError> {
    let mut retries_left = policy.retries;
    let mut attempt: u32 = 0;
    // Nothing observed yet, so everything counts as missing
    let mut missing = targets.names().clone();

    loop {
        attempt = next_attempt(attempt);

        match catalog.list_services().await {
            Ok(registered) => {
                missing = targets.missing_from(&registered);
                metrics.set_missing_services(missing.len());

                if missing.is_empty() {
                    metrics.record_attempt(PHASE_MEMBERSHIP, RESULT_SATISFIED);
                    info!(
                        attempt,
                        registered = registered.len(),
                        "All target services registered"
                    );
                    return Ok(Membership {
                        registered,
                        attempts: attempt,
                    });
                }

                metrics.record_attempt(PHASE_MEMBERSHIP, RESULT_UNMET);
                info!(attempt, missing = ?missing, "Waiting for services to register");
            }
            Err(e) if !e.is_retryable() => return Err(WaitError::Catalog(e)),
            Err(e) => {
                metrics.record_attempt(PHASE_MEMBERSHIP, RESULT_ERROR);
                warn!(attempt, error = %e, "Catalog query failed, counting attempt as a miss");
            }
        }

        if retries_left == 0 {
            return Err(WaitError::MembershipTimeout {
                attempts: attempt,
                missing,
            });
        }

        retries_left -= 1;
        info!(retries_left, interval = ?policy.interval, "Retrying service check");
        tokio::time::sleep(policy.interval).await;
    }
}
