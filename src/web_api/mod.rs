//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP routing onto the supervisor and record provider
//! - Response formatting
//!
//! Handlers stay thin: every decision lives in the supervisor.

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        records_backend: state.records.backend_name().to_string(),
        live_pipelines: state.supervisor.live_count().await,
        active_section: state.supervisor.active_section().await,
        admission: state.admission.get_status().await,
    };

    Json(response)
}
