//! StreamSupervisor types

use crate::error::Error;
use crate::frame_buffer::FrameBuffer;
use crate::record_provider::{CameraId, SectionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

/// Pipeline health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamHealth {
    /// Decoder launched, no frame published yet
    Starting,
    /// Frames arriving within the timeout
    Healthy,
    /// No frame within the timeout; restart pending
    Unresponsive,
    /// Terminal; decoder terminated, buffer closed
    Stopped,
}

impl StreamHealth {
    pub fn is_live(&self) -> bool {
        !matches!(self, StreamHealth::Stopped)
    }
}

/// Supervisor timing and restart policy
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// No published frame for this long marks the pipeline Unresponsive
    pub frame_timeout: Duration,
    /// Deadline of a single frame read; also the monitoring granularity
    pub read_timeout: Duration,
    /// Delay before each restart attempt
    pub restart_cooldown: Duration,
    /// Consecutive failed restarts before giving up
    pub max_restart_attempts: u32,
    /// Wait for a pipeline task to wind down before aborting it
    pub stop_timeout: Duration,
    /// Wait for a start/stop of the same camera already in progress
    pub camera_lock_timeout: Duration,
}

/// Mutable per-pipeline state, shared between the task and the registry
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub camera_id: CameraId,
    pub section_id: Option<SectionId>,
    pub health: StreamHealth,
    pub started_at: DateTime<Utc>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub restart_attempts: u32,
    /// Decoder processes launched so far, initial one included
    pub launches: u32,
    pub frames_published: u64,
    /// Current decoder process, `None` between restarts and once stopped
    pub pid: Option<u32>,
}

impl PipelineStatus {
    pub(super) fn new(camera_id: CameraId, section_id: Option<SectionId>, pid: Option<u32>) -> Self {
        Self {
            camera_id,
            section_id,
            health: StreamHealth::Starting,
            started_at: Utc::now(),
            last_frame_at: None,
            restart_attempts: 0,
            launches: 1,
            frames_published: 0,
            pid,
        }
    }
}

/// Status row returned by `snapshot`
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatusView {
    #[serde(flatten)]
    pub status: PipelineStatus,
    pub viewers: usize,
    pub latest_seq: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Access to a running pipeline's output
#[derive(Clone)]
pub struct StreamHandle {
    pub camera_id: CameraId,
    pub outcome: EnsureOutcome,
    pub buffer: FrameBuffer,
    pub(crate) viewers: Arc<AtomicUsize>,
}

/// Why one camera of a switch could not be started or stopped
#[derive(Debug, Clone, Serialize)]
pub struct SwitchFailure {
    pub error_code: String,
    pub message: String,
}

impl From<&Error> for SwitchFailure {
    fn from(e: &Error) -> Self {
        Self {
            error_code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Outcome of moving the active set to a new camera set
#[derive(Debug, Clone, Default, Serialize)]
pub struct SwitchReport {
    pub section_id: Option<SectionId>,
    pub started: Vec<CameraId>,
    pub retained: Vec<CameraId>,
    pub stopped: Vec<CameraId>,
    pub failed: BTreeMap<CameraId, SwitchFailure>,
}

impl SwitchReport {
    /// Cameras streaming after the switch, in id order
    pub fn streaming(&self) -> Vec<CameraId> {
        let mut ids: Vec<_> = self
            .started
            .iter()
            .chain(self.retained.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}
