//! Shared API response models

use crate::admission_controller::AdmissionStatus;
use crate::record_provider::{Camera, CameraId, Section, SectionId};
use crate::supervisor::{StreamHealth, SwitchFailure};
use serde::Serialize;
use std::collections::BTreeMap;

/// Standard API response wrapper; errors are rendered by `Error` instead
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub records_backend: String,
    pub live_pipelines: usize,
    pub active_section: Option<SectionId>,
    /// Cap and host load as seen by admission
    pub admission: AdmissionStatus,
}

/// Section activation result
#[derive(Debug, Clone, Serialize)]
pub struct MultiStreamResponse {
    pub message: String,
    pub section_id: SectionId,
    /// Camera id → feed URL for every camera now streaming
    pub streams: BTreeMap<CameraId, String>,
    pub started: Vec<CameraId>,
    pub retained: Vec<CameraId>,
    pub stopped: Vec<CameraId>,
    pub failed: BTreeMap<CameraId, SwitchFailure>,
}

/// Section with its cameras
#[derive(Debug, Clone, Serialize)]
pub struct SectionDetail {
    #[serde(flatten)]
    pub section: Section,
    pub cameras: Vec<Camera>,
}

/// Camera with its current pipeline health
#[derive(Debug, Clone, Serialize)]
pub struct CameraDetail {
    #[serde(flatten)]
    pub camera: Camera,
    pub stream_health: Option<StreamHealth>,
    /// Live pipeline (not Stopped)
    pub streaming: bool,
    pub feed_url: String,
}

/// Stop request result
#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub camera_id: CameraId,
    pub outcome: crate::supervisor::StopOutcome,
}
