use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::{BackendSummary, HealthResponse};
use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let total = state.load_balancer.all_backends().len();
    let healthy = state.load_balancer.healthy_count();

    Json(HealthResponse {
        status: if healthy > 0 { "healthy" } else { "degraded" },
        timestamp: chrono::Utc::now().to_rfc3339(),
        backends: BackendSummary { total, healthy },
    })
}
