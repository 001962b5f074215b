//! API Routes

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{
    ApiResponse, CameraDetail, MultiStreamResponse, SectionDetail, StopResponse,
};
use crate::record_provider::{CameraId, SectionId};
use crate::state::AppState;
use crate::viewer_feed::MULTIPART_CONTENT_TYPE;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Streaming
        .route("/api/video_feed/:camera_id", get(video_feed))
        .route("/api/video_feed/:camera_id/", get(video_feed))
        .route("/api/multi_stream/:section_id", get(multi_stream))
        .route("/api/multi_stream/:section_id/", get(multi_stream))
        .route("/api/streams", get(list_streams))
        .route("/api/streams/:camera_id", delete(stop_stream))
        // Records
        .route("/api/sites", get(list_sites))
        .route("/api/sections", get(list_sections))
        .route("/api/sections/:section_id", get(get_section))
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:camera_id", get(get_camera))
        // Reachability
        .route("/api/reachability", get(get_reachability))
        .with_state(state)
}

// ========================================
// Streaming
// ========================================

async fn video_feed(
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Response> {
    let feed = state
        .supervisor
        .open_feed(camera_id, &state.config.feed_config())
        .await?;

    tracing::info!(
        camera_id = %camera_id,
        viewer_id = %feed.viewer_id(),
        "Viewer connected"
    );

    let body = Body::from_stream(feed.into_multipart_stream());
    Ok((
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        body,
    )
        .into_response())
}

async fn multi_stream(
    State(state): State<AppState>,
    Path(section_id): Path<SectionId>,
) -> Result<Json<ApiResponse<MultiStreamResponse>>> {
    let report = state.supervisor.activate_section(section_id).await?;

    let streams: BTreeMap<CameraId, String> = report
        .streaming()
        .into_iter()
        .map(|id| (id, state.config.feed_url(id)))
        .collect();

    Ok(Json(ApiResponse::success(MultiStreamResponse {
        message: "All cameras feed path".to_string(),
        section_id,
        streams,
        started: report.started,
        retained: report.retained,
        stopped: report.stopped,
        failed: report.failed,
    })))
}

async fn list_streams(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.supervisor.snapshot().await))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<ApiResponse<StopResponse>>> {
    let outcome = state.supervisor.stop(camera_id).await?;
    Ok(Json(ApiResponse::success(StopResponse { camera_id, outcome })))
}

// ========================================
// Records
// ========================================

async fn list_sites(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let sites = state.records.list_sites().await?;
    Ok(Json(ApiResponse::success(sites)))
}

async fn list_sections(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let sections = state.records.list_sections().await?;
    Ok(Json(ApiResponse::success(sections)))
}

async fn get_section(
    State(state): State<AppState>,
    Path(section_id): Path<SectionId>,
) -> Result<impl IntoResponse> {
    let section = state.records.get_section(section_id).await?;
    let cameras = state.records.list_cameras_for_section(section_id).await?;
    Ok(Json(ApiResponse::success(SectionDetail { section, cameras })))
}

async fn list_cameras(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let cameras = state.records.list_cameras().await?;
    Ok(Json(ApiResponse::success(cameras)))
}

async fn get_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<impl IntoResponse> {
    let camera = state.records.get_camera(camera_id).await?;
    Ok(Json(ApiResponse::success(CameraDetail {
        stream_health: state.supervisor.health(camera_id).await,
        streaming: state.supervisor.is_streaming(camera_id).await,
        feed_url: state.config.feed_url(camera_id),
        camera,
    })))
}

// ========================================
// Reachability
// ========================================

#[derive(Debug, Deserialize)]
struct ReachabilityQuery {
    #[serde(default)]
    refresh: bool,
}

async fn get_reachability(
    State(state): State<AppState>,
    Query(query): Query<ReachabilityQuery>,
) -> Result<impl IntoResponse> {
    let report = match state.reachability.latest().await {
        Some(report) if !query.refresh => report,
        _ => state.reachability.run_once().await?,
    };
    Ok(Json(ApiResponse::success(report)))
}
