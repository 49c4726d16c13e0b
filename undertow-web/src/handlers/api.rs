//! Operational JSON endpoints

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub active_jobs: usize,
    pub uptime_seconds: u64,
}

pub async fn api_health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        active_jobs: state.swarm.registry().len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Lists registry jobs, oldest first.
pub async fn api_jobs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let jobs = state.swarm.snapshot();
    Json(json!({
        "total": jobs.len(),
        "jobs": jobs,
    }))
}
