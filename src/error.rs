//! Error handling for the multi-camera streamer

use crate::record_provider::{CameraId, SectionId};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera id unknown to the record provider
    #[error("Camera not found: {0}")]
    CameraNotFound(CameraId),

    /// Section id unknown to the record provider
    #[error("Section not found: {0}")]
    SectionNotFound(SectionId),

    /// Camera exists but is disabled
    #[error("Camera {0} is not active")]
    CameraInactive(CameraId),

    /// Concurrency cap reached, no new pipeline admitted
    #[error("Stream capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },

    /// Host overloaded, no new pipeline admitted
    #[error("System overload: cpu {cpu_percent:.1}%, memory {memory_percent:.1}%")]
    SystemOverload { cpu_percent: f32, memory_percent: f32 },

    /// Another start/stop of the same camera did not finish in time
    #[error("Camera {0} busy (start/stop in progress)")]
    CameraBusy(CameraId),

    /// Decoder process could not be spawned
    #[error("Failed to launch decoder for camera {camera_id}: {message}")]
    Launch { camera_id: CameraId, message: String },

    /// Raw frame could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Nothing could be served
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code, also used in multi_stream failure maps
    pub fn code(&self) -> &'static str {
        match self {
            Error::CameraNotFound(_) => "CAMERA_NOT_FOUND",
            Error::SectionNotFound(_) => "SECTION_NOT_FOUND",
            Error::CameraInactive(_) => "CAMERA_INACTIVE",
            Error::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Error::SystemOverload { .. } => "SYSTEM_OVERLOAD",
            Error::CameraBusy(_) => "CAMERA_BUSY",
            Error::Launch { .. } => "LAUNCH_ERROR",
            Error::Encode(_) => "ENCODE_ERROR",
            Error::Unavailable(_) => "UNAVAILABLE",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Sqlx(_) => "DATABASE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::CameraNotFound(_) | Error::SectionNotFound(_) => StatusCode::NOT_FOUND,
            Error::CameraInactive(_) => StatusCode::CONFLICT,
            Error::CapacityExceeded { .. }
            | Error::SystemOverload { .. }
            | Error::CameraBusy(_)
            | Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
