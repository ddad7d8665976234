//! In-memory catalog that replays a script of answers, for waiter tests

use super::{Catalog, CatalogError, HealthCheckResult};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

type ServicesAnswer = Result<BTreeSet<String>, CatalogError>;
type ChecksAnswer = Result<Vec<HealthCheckResult>, CatalogError>;

/// Replays scripted answers in order; the last answer repeats forever
#[derive(Default)]
pub struct ScriptedCatalog {
    services: Mutex<VecDeque<ServicesAnswer>>,
    checks: Mutex<HashMap<String, VecDeque<ChecksAnswer>>>,
    service_calls: Mutex<u32>,
    check_calls: Mutex<Vec<String>>,
}

pub fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn check(name: &str, status: &str) -> HealthCheckResult {
    HealthCheckResult::from_status(name, status)
}

#[allow(clippy::unwrap_used)]
impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_services(self, registered: &[&str]) -> Self {
        self.services.lock().unwrap().push_back(Ok(names(registered)));
        self
    }

    pub fn then_services_error(self, error: CatalogError) -> Self {
        self.services.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn then_checks(self, service: &str, results: Vec<HealthCheckResult>) -> Self {
        self.checks
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .push_back(Ok(results));
        self
    }

    pub fn then_checks_error(self, service: &str, error: CatalogError) -> Self {
        self.checks
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .push_back(Err(error));
        self
    }

    /// Number of `list_services` calls so far
    pub fn service_calls(&self) -> u32 {
        *self.service_calls.lock().unwrap()
    }

    /// Services passed to `list_health_checks`, in call order
    pub fn check_calls(&self) -> Vec<String> {
        self.check_calls.lock().unwrap().clone()
    }
}

/// Pop the next answer, keeping the final one for every later call
fn next_answer<T: Clone + Default>(
    queue: &mut VecDeque<Result<T, CatalogError>>,
) -> Result<T, CatalogError> {
    if queue.len() > 1 {
        if let Some(answer) = queue.pop_front() {
            return answer;
        }
    }
    match queue.front() {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(e)) => Err(replay(e)),
        None => Ok(T::default()),
    }
}

/// Rebuild a scripted error so it can be returned again
fn replay(error: &CatalogError) -> CatalogError {
    match error {
        CatalogError::Status { status, url } => CatalogError::Status {
            status: *status,
            url: url.clone(),
        },
        CatalogError::Decode { url, reason } => CatalogError::Decode {
            url: url.clone(),
            reason: reason.clone(),
        },
        CatalogError::InvalidUrl(url) => CatalogError::InvalidUrl(url.clone()),
        CatalogError::Unresolvable { host, source } => CatalogError::Unresolvable {
            host: host.clone(),
            source: std::io::Error::new(source.kind(), source.to_string()),
        },
        CatalogError::Request(e) => CatalogError::Status {
            status: 503,
            url: e.to_string(),
        },
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl Catalog for ScriptedCatalog {
    async fn list_services(&self) -> Result<BTreeSet<String>, CatalogError> {
        *self.service_calls.lock().unwrap() += 1;
        next_answer(&mut self.services.lock().unwrap())
    }

    async fn list_health_checks(
        &self,
        service: &str,
    ) -> Result<Vec<HealthCheckResult>, CatalogError> {
        self.check_calls.lock().unwrap().push(service.to_string());
        let mut checks = self.checks.lock().unwrap();
        match checks.get_mut(service) {
            Some(queue) => next_answer(queue),
            None => Ok(Vec::new()),
        }
    }
}
