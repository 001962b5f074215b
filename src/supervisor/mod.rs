//! StreamSupervisor - decoder pipeline registry
//!
//! ## Responsibilities
//!
//! - At most one pipeline (decoder process + task) per camera
//! - Concurrency cap and overload rejection via AdmissionController
//! - Section switching by set difference: stop departed, keep common, start new
//! - Health tracking, bounded restarts, garbage collection of Stopped entries
//!
//! ## Locking
//!
//! - `camera_locks`: serializes start/stop of one camera, held across process
//!   termination so a replacement never overlaps the old process
//! - `pipelines`: registry map; write lock held from the cap check to the insert
//! - `switch_lock`: one section switch at a time

mod camera_locks;
mod pipeline;
mod types;

pub use camera_locks::{CameraLease, CameraLocks};
pub use types::*;

use crate::admission_controller::AdmissionController;
use crate::decoder::{DecoderConfig, DecoderProcess};
use crate::encoder::FrameEncoder;
use crate::error::{Error, Result};
use crate::frame_buffer::{frame_buffer, FrameBuffer};
use crate::record_provider::{Camera, CameraId, RecordProvider, SectionId};
use crate::viewer_feed::{FeedConfig, ViewerFeed};
use pipeline::Pipeline;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Registry entry for one camera
struct PipelineEntry {
    camera_id: CameraId,
    status: Arc<RwLock<PipelineStatus>>,
    buffer: FrameBuffer,
    viewers: Arc<AtomicUsize>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PipelineEntry {
    async fn health(&self) -> StreamHealth {
        self.status.read().await.health
    }

    fn handle(&self, outcome: EnsureOutcome) -> StreamHandle {
        StreamHandle {
            camera_id: self.camera_id,
            outcome,
            buffer: self.buffer.clone(),
            viewers: self.viewers.clone(),
        }
    }

    /// Signal the task and wait for it; abort when it does not finish in time
    async fn shutdown(mut self, wait: std::time::Duration) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        match timeout(wait, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(camera_id = %self.camera_id, error = %e, "Pipeline task failed");
            }
            Err(_) => {
                tracing::warn!(
                    camera_id = %self.camera_id,
                    wait_ms = wait.as_millis() as u64,
                    "Pipeline did not stop in time, aborting task"
                );
                // Dropping the task drops the decoder, and kill_on_drop kills it.
                self.task.abort();
                let _ = (&mut self.task).await;
                let mut status = self.status.write().await;
                status.health = StreamHealth::Stopped;
                status.pid = None;
            }
        }
    }
}

/// StreamSupervisor instance
pub struct StreamSupervisor {
    records: Arc<RecordProvider>,
    admission: Arc<AdmissionController>,
    decoder_config: Arc<DecoderConfig>,
    encoder: Arc<FrameEncoder>,
    config: Arc<SupervisorConfig>,
    pipelines: RwLock<HashMap<CameraId, PipelineEntry>>,
    camera_locks: CameraLocks,
    switch_lock: Mutex<()>,
    active_section: RwLock<Option<SectionId>>,
}

impl StreamSupervisor {
    /// Create new StreamSupervisor
    pub fn new(
        records: Arc<RecordProvider>,
        admission: Arc<AdmissionController>,
        decoder_config: DecoderConfig,
        encoder: FrameEncoder,
        config: SupervisorConfig,
    ) -> Self {
        let camera_locks = CameraLocks::with_timeout(config.camera_lock_timeout);
        Self {
            records,
            admission,
            decoder_config: Arc::new(decoder_config),
            encoder: Arc::new(encoder),
            config: Arc::new(config),
            pipelines: RwLock::new(HashMap::new()),
            camera_locks,
            switch_lock: Mutex::new(()),
            active_section: RwLock::new(None),
        }
    }

    pub fn max_pipelines(&self) -> usize {
        self.admission.max_pipelines()
    }

    /// Make sure camera `camera_id` is streaming, starting it if needed
    pub async fn ensure_streaming(&self, camera_id: CameraId) -> Result<StreamHandle> {
        let camera = self.records.get_camera(camera_id).await?;
        if !camera.is_active {
            return Err(Error::CameraInactive(camera_id));
        }
        self.ensure_camera(&camera).await
    }

    /// Idempotent start for an already resolved camera record.
    ///
    /// A live pipeline is returned as-is; a Stopped leftover is replaced.
    pub async fn ensure_camera(&self, camera: &Camera) -> Result<StreamHandle> {
        let _lease = self.camera_locks.acquire(camera.id).await?;
        let mut pipelines = self.pipelines.write().await;

        if let Some(entry) = pipelines.get(&camera.id) {
            if entry.health().await.is_live() {
                return Ok(entry.handle(EnsureOutcome::AlreadyRunning));
            }
        }
        if pipelines.remove(&camera.id).is_some() {
            tracing::debug!(camera_id = %camera.id, "Replacing stopped pipeline");
        }

        let live = count_live(&pipelines).await;
        self.admission.admit(live).await?;

        let decoder =
            DecoderProcess::spawn(camera.id, &camera.connection_url(), &self.decoder_config)
                .map_err(|e| {
                    tracing::error!(camera_id = %camera.id, error = %e, "Decoder launch failed");
                    e
                })?;
        let pid = decoder.pid();

        let status = Arc::new(RwLock::new(PipelineStatus::new(
            camera.id,
            camera.section_id,
            pid,
        )));
        let (publisher, buffer) = frame_buffer();
        let (stop_tx, stop_rx) = oneshot::channel();

        let pipeline = Pipeline {
            camera_id: camera.id,
            url: camera.connection_url(),
            decoder_config: self.decoder_config.clone(),
            encoder: self.encoder.clone(),
            config: self.config.clone(),
            status: status.clone(),
            publisher,
        };
        let task = tokio::spawn(pipeline.run(decoder, stop_rx));

        let entry = PipelineEntry {
            camera_id: camera.id,
            status,
            buffer,
            viewers: Arc::new(AtomicUsize::new(0)),
            stop_tx: Some(stop_tx),
            task,
        };
        let handle = entry.handle(EnsureOutcome::Started);
        pipelines.insert(camera.id, entry);

        tracing::info!(
            camera_id = %camera.id,
            camera_name = %camera.name,
            pid = ?pid,
            live = live + 1,
            "Pipeline started"
        );

        Ok(handle)
    }

    /// Ensure the camera is streaming and attach a new viewer to it
    pub async fn open_feed(&self, camera_id: CameraId, feed: &FeedConfig) -> Result<ViewerFeed> {
        let handle = self.ensure_streaming(camera_id).await?;
        Ok(ViewerFeed::new(&handle, feed))
    }

    /// Stop one camera's pipeline and terminate its decoder
    pub async fn stop(&self, camera_id: CameraId) -> Result<StopOutcome> {
        let _lease = self.camera_locks.acquire(camera_id).await?;
        let entry = self.pipelines.write().await.remove(&camera_id);

        let Some(entry) = entry else {
            return Ok(StopOutcome::NotRunning);
        };

        let was_live = entry.health().await.is_live();
        entry.shutdown(self.config.stop_timeout).await;

        if was_live {
            tracing::info!(camera_id = %camera_id, "Pipeline stopped");
            Ok(StopOutcome::Stopped)
        } else {
            Ok(StopOutcome::NotRunning)
        }
    }

    /// Move the active set to exactly `cameras`.
    ///
    /// Cameras in both sets keep their pipeline untouched. Departed cameras
    /// are stopped (concurrently) before new ones start, so capacity freed by
    /// the switch is available to the incoming set.
    pub async fn switch_to(&self, cameras: &[Camera], section_id: Option<SectionId>) -> SwitchReport {
        let _switch = self.switch_lock.lock().await;

        let desired: BTreeMap<CameraId, &Camera> = cameras.iter().map(|c| (c.id, c)).collect();
        let current = self.live_ids().await;

        let mut report = SwitchReport {
            section_id,
            ..SwitchReport::default()
        };

        let departing: Vec<CameraId> = current
            .iter()
            .filter(|id| !desired.contains_key(*id))
            .copied()
            .collect();
        report.retained = current
            .iter()
            .filter(|id| desired.contains_key(*id))
            .copied()
            .collect();

        let stops = futures::future::join_all(departing.iter().map(|id| self.stop(*id))).await;
        for (camera_id, result) in departing.iter().zip(stops) {
            match result {
                Ok(_) => report.stopped.push(*camera_id),
                Err(e) => {
                    tracing::error!(camera_id = %camera_id, error = %e, "Stop during switch failed");
                    report.failed.insert(*camera_id, SwitchFailure::from(&e));
                }
            }
        }

        for (camera_id, camera) in desired.iter().filter(|(id, _)| !current.contains(*id)) {
            match self.ensure_camera(camera).await {
                Ok(handle) if handle.outcome == EnsureOutcome::Started => {
                    report.started.push(*camera_id)
                }
                Ok(_) => report.retained.push(*camera_id),
                Err(e) => {
                    tracing::warn!(camera_id = %camera_id, error = %e, "Start during switch failed");
                    report.failed.insert(*camera_id, SwitchFailure::from(&e));
                }
            }
        }
        report.retained.sort_unstable();

        *self.active_section.write().await = section_id;

        tracing::info!(
            section_id = ?section_id,
            started = ?report.started,
            retained = ?report.retained,
            stopped = ?report.stopped,
            failed = report.failed.len(),
            "Active set switched"
        );

        report
    }

    /// Make `section_id`'s active cameras the active set
    pub async fn activate_section(&self, section_id: SectionId) -> Result<SwitchReport> {
        let cameras: Vec<Camera> = self
            .records
            .list_cameras_for_section(section_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect();

        if cameras.is_empty() {
            tracing::warn!(section_id = %section_id, "Section has no active cameras");
            return Err(Error::Unavailable("No active cameras found".to_string()));
        }

        let report = self.switch_to(&cameras, Some(section_id)).await;

        if report.streaming().is_empty() {
            let all_capacity = report
                .failed
                .values()
                .all(|f| f.error_code == "CAPACITY_EXCEEDED");
            return Err(if all_capacity {
                Error::CapacityExceeded {
                    limit: self.max_pipelines(),
                }
            } else {
                Error::Unavailable("No active cameras found".to_string())
            });
        }

        Ok(report)
    }

    pub async fn active_section(&self) -> Option<SectionId> {
        *self.active_section.read().await
    }

    pub async fn is_streaming(&self, camera_id: CameraId) -> bool {
        matches!(self.health(camera_id).await, Some(h) if h.is_live())
    }

    pub async fn health(&self, camera_id: CameraId) -> Option<StreamHealth> {
        let pipelines = self.pipelines.read().await;
        match pipelines.get(&camera_id) {
            Some(entry) => Some(entry.health().await),
            None => None,
        }
    }

    /// Number of live (not Stopped) pipelines
    pub async fn live_count(&self) -> usize {
        count_live(&*self.pipelines.read().await).await
    }

    /// Status of every registered pipeline, ordered by camera id
    pub async fn snapshot(&self) -> Vec<StreamStatusView> {
        let pipelines = self.pipelines.read().await;
        let mut views = Vec::with_capacity(pipelines.len());
        for entry in pipelines.values() {
            views.push(StreamStatusView {
                status: entry.status.read().await.clone(),
                viewers: entry.viewers.load(Ordering::Relaxed),
                latest_seq: entry.buffer.latest().map(|f| f.seq),
            });
        }
        views.sort_by_key(|v| v.status.camera_id);
        views
    }

    /// Drop Stopped entries (Stopped → Absent). Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut stopped = Vec::new();
        {
            let pipelines = self.pipelines.read().await;
            for (camera_id, entry) in pipelines.iter() {
                if !entry.health().await.is_live() {
                    stopped.push(*camera_id);
                }
            }
        }

        let mut removed = 0;
        for camera_id in stopped {
            let Ok(_lease) = self.camera_locks.acquire(camera_id).await else {
                continue;
            };
            let entry = {
                let mut pipelines = self.pipelines.write().await;
                let still_stopped = match pipelines.get(&camera_id) {
                    Some(entry) => !entry.health().await.is_live(),
                    None => false,
                };
                if still_stopped {
                    pipelines.remove(&camera_id)
                } else {
                    None
                }
            };
            if let Some(entry) = entry {
                entry.shutdown(self.config.stop_timeout).await;
                removed += 1;
                tracing::debug!(camera_id = %camera_id, "Stopped pipeline removed");
            }
        }
        removed
    }

    /// Stop every pipeline (process exit)
    pub async fn shutdown_all(&self) {
        let ids: Vec<CameraId> = self.pipelines.read().await.keys().copied().collect();
        tracing::info!(count = ids.len(), "Stopping all pipelines");

        let results = futures::future::join_all(ids.iter().map(|id| self.stop(*id))).await;
        for (camera_id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!(camera_id = %camera_id, error = %e, "Failed to stop pipeline");
            }
        }
        *self.active_section.write().await = None;
    }

    async fn live_ids(&self) -> BTreeSet<CameraId> {
        let pipelines = self.pipelines.read().await;
        let mut ids = BTreeSet::new();
        for (camera_id, entry) in pipelines.iter() {
            if entry.health().await.is_live() {
                ids.insert(*camera_id);
            }
        }
        ids
    }
}

async fn count_live(pipelines: &HashMap<CameraId, PipelineEntry>) -> usize {
    let mut live = 0;
    for entry in pipelines.values() {
        if entry.health().await.is_live() {
            live += 1;
        }
    }
    live
}
