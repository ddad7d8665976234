//! In-process fake Consul catalog for end-to-end gate tests
//!
//! Serves `/v1/catalog/services` and `/v1/health/checks/{service}` from a
//! script: each endpoint walks through its scripted answers one call at a
//! time and keeps repeating the last one.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One scripted answer for the service listing
#[derive(Debug, Clone)]
pub enum ServicesAnswer {
    Registered(Vec<&'static str>),
    HttpError(u16),
}

/// Scripted catalog contents and call counters
#[derive(Debug, Default)]
pub struct FakeState {
    pub services: Vec<ServicesAnswer>,
    /// Per service: successive check lists of `(name, status)`
    pub checks: HashMap<String, Vec<Vec<(&'static str, &'static str)>>>,
    pub service_calls: usize,
    pub check_calls: HashMap<String, usize>,
}

impl FakeState {
    pub fn then_services(mut self, registered: &[&'static str]) -> Self {
        self.services
            .push(ServicesAnswer::Registered(registered.to_vec()));
        self
    }

    pub fn then_services_status(mut self, status: u16) -> Self {
        self.services.push(ServicesAnswer::HttpError(status));
        self
    }

    pub fn then_checks(
        mut self,
        service: &str,
        checks: &[(&'static str, &'static str)],
    ) -> Self {
        self.checks
            .entry(service.to_string())
            .or_default()
            .push(checks.to_vec());
        self
    }
}

pub type SharedState = Arc<Mutex<FakeState>>;

/// Pick the answer for the `call`-th request (0-based), repeating the last
fn scripted<T>(answers: &[T], call: usize) -> Option<&T> {
    answers.get(call).or_else(|| answers.last())
}

#[allow(clippy::unwrap_used)]
async fn list_services(State(state): State<SharedState>) -> Response {
    let mut state = state.lock().unwrap();
    let call = state.service_calls;
    state.service_calls += 1;

    match scripted(&state.services, call) {
        Some(ServicesAnswer::Registered(names)) => {
            let body: Map<String, Value> = names
                .iter()
                .map(|name| (name.to_string(), json!([])))
                .collect();
            Json(Value::Object(body)).into_response()
        }
        Some(ServicesAnswer::HttpError(status)) => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "scripted failure",
        )
            .into_response(),
        None => Json(json!({})).into_response(),
    }
}

#[allow(clippy::unwrap_used)]
async fn list_checks(
    State(state): State<SharedState>,
    Path(service): Path<String>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let counter = state.check_calls.entry(service.clone()).or_insert(0);
    let call = *counter;
    *counter += 1;

    let checks = state
        .checks
        .get(&service)
        .and_then(|script| scripted(script, call))
        .cloned()
        .unwrap_or_default();

    Json(Value::Array(
        checks
            .into_iter()
            .map(|(name, status)| {
                json!({
                    "Node": "ci-node",
                    "CheckID": format!("{}:{}", service, name),
                    "Name": name,
                    "Status": status,
                    "ServiceName": service,
                })
            })
            .collect(),
    ))
}

/// A running fake catalog
pub struct FakeCatalog {
    pub base_url: String,
    pub state: SharedState,
}

impl FakeCatalog {
    pub async fn start(state: FakeState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route("/v1/catalog/services", get(list_services))
            .route("/v1/health/checks/{service}", get(list_checks))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake catalog");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake catalog");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn service_calls(&self) -> usize {
        self.state.lock().unwrap().service_calls
    }

    #[allow(clippy::unwrap_used)]
    pub fn check_calls(&self, service: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .check_calls
            .get(service)
            .copied()
            .unwrap_or(0)
    }
}
