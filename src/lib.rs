//! Multi-camera streamer library
//!
//! Pulls RTSP camera streams through external decoder processes and serves
//! them to browsers as MJPEG.
//!
//! ## Architecture
//!
//! 1. RecordProvider - sites, sections and cameras (JSON inventory or MySQL)
//! 2. Decoder - one external decoder process per camera, raw frames on stdout
//! 3. Encoder - raw frame to JPEG
//! 4. FrameBuffer - latest frame per camera, shared by all viewers
//! 5. StreamSupervisor - pipeline registry, cap, restarts, section switching
//! 6. AdmissionController - concurrency cap and overload rejection
//! 7. ViewerFeed - paced per-viewer multipart stream
//! 8. ReachabilityProbe - periodic TCP probe report, independent of streaming
//! 9. WebAPI - HTTP routes
//!
//! ## Design Principles
//!
//! - One decoder process per camera, however many viewers
//! - Viewers read shared state only and never block the pipeline
//! - Every process the supervisor starts is terminated by it

pub mod admission_controller;
pub mod camera_status_tracker;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame_buffer;
pub mod models;
pub mod reachability_probe;
pub mod record_provider;
pub mod state;
pub mod supervisor;
pub mod viewer_feed;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
