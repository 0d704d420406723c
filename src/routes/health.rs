//! Liveness probe (`/health`, `/healthz`)
//!
//! Answers 200 whenever the process is serving; storage is not consulted.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::config::StorageBackend;
use crate::routes::helpers::{json_response, FullBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub storage: &'static str,
    pub dev_mode: bool,
    /// Audit entries that never reached storage
    pub audit_dropped: u64,
    pub timestamp: String,
}

pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        storage: match state.args.storage {
            StorageBackend::Mongo => "mongo",
            StorageBackend::Memory => "memory",
        },
        dev_mode: state.args.dev_mode,
        audit_dropped: state.audit.dropped_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &response)
}
