//! Per-camera pipeline task: decode → encode → publish
//!
//! One task per live camera. It owns the decoder process and the frame
//! publisher; when it returns, the publisher drops and every viewer of the
//! camera sees the buffer close.

use super::types::{PipelineStatus, StreamHealth, SupervisorConfig};
use crate::decoder::{DecoderConfig, DecoderProcess, RawFrame, ReadOutcome};
use crate::encoder::FrameEncoder;
use crate::frame_buffer::FramePublisher;
use crate::record_provider::CameraId;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::time::Instant;

pub(super) struct Pipeline {
    pub camera_id: CameraId,
    pub url: String,
    pub decoder_config: Arc<DecoderConfig>,
    pub encoder: Arc<FrameEncoder>,
    pub config: Arc<SupervisorConfig>,
    pub status: Arc<RwLock<PipelineStatus>>,
    pub publisher: FramePublisher,
}

enum Step {
    Stop,
    Read(ReadOutcome),
}

impl Pipeline {
    /// Drive the pipeline until stopped or out of restart attempts
    pub async fn run(mut self, mut decoder: DecoderProcess, mut stop_rx: oneshot::Receiver<()>) {
        let mut last_progress = Instant::now();

        loop {
            let step = tokio::select! {
                biased;
                _ = &mut stop_rx => Step::Stop,
                outcome = decoder.read_frame(self.config.read_timeout) => Step::Read(outcome),
            };

            let stalled = match step {
                Step::Stop => {
                    decoder.terminate().await;
                    self.mark_stopped().await;
                    tracing::info!(camera_id = %self.camera_id, "Pipeline stopped on request");
                    return;
                }
                Step::Read(ReadOutcome::Frame(raw)) => {
                    last_progress = Instant::now();
                    self.deliver(raw).await;
                    false
                }
                Step::Read(ReadOutcome::Incomplete) => {
                    last_progress.elapsed() >= self.config.frame_timeout
                }
                Step::Read(ReadOutcome::EndOfStream) => {
                    tracing::warn!(camera_id = %self.camera_id, "Decoder output closed");
                    true
                }
            };

            if !stalled {
                continue;
            }

            match self.restart(decoder, &mut stop_rx).await {
                Some(next) => {
                    decoder = next;
                    last_progress = Instant::now();
                }
                None => return,
            }
        }
    }

    async fn deliver(&mut self, raw: RawFrame) {
        let encoder = self.encoder.clone();
        let seq = raw.seq;
        let captured_at = raw.captured_at;

        match tokio::task::spawn_blocking(move || encoder.encode(&raw)).await {
            Ok(Ok(jpeg)) => {
                let published = self.publisher.published() + 1;
                self.publisher.publish(jpeg, captured_at);

                let mut status = self.status.write().await;
                if status.health != StreamHealth::Healthy {
                    tracing::info!(
                        camera_id = %self.camera_id,
                        pid = ?status.pid,
                        "Pipeline healthy"
                    );
                }
                status.health = StreamHealth::Healthy;
                status.last_frame_at = Some(captured_at);
                status.restart_attempts = 0;
                status.frames_published = published;
            }
            Ok(Err(e)) => {
                tracing::warn!(camera_id = %self.camera_id, seq = seq, error = %e, "Frame dropped");
            }
            Err(e) => {
                tracing::error!(camera_id = %self.camera_id, error = %e, "Encode task failed");
            }
        }
    }

    /// Terminate the stalled decoder and launch a new one after the cooldown.
    ///
    /// Returns `None` when the pipeline ended (budget exhausted or stop).
    async fn restart(
        &mut self,
        decoder: DecoderProcess,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> Option<DecoderProcess> {
        {
            let mut status = self.status.write().await;
            status.health = StreamHealth::Unresponsive;
            status.pid = None;
            tracing::warn!(
                camera_id = %self.camera_id,
                timeout_ms = self.config.frame_timeout.as_millis() as u64,
                restart_attempts = status.restart_attempts,
                "Pipeline unresponsive"
            );
        }
        decoder.terminate().await;

        loop {
            let attempt = {
                let mut status = self.status.write().await;
                if status.restart_attempts >= self.config.max_restart_attempts {
                    status.health = StreamHealth::Stopped;
                    tracing::error!(
                        camera_id = %self.camera_id,
                        attempts = status.restart_attempts,
                        "Restart budget exhausted, pipeline stopped"
                    );
                    return None;
                }
                status.restart_attempts += 1;
                status.restart_attempts
            };

            tracing::info!(
                camera_id = %self.camera_id,
                attempt = attempt,
                max_attempts = self.config.max_restart_attempts,
                cooldown_ms = self.config.restart_cooldown.as_millis() as u64,
                "Restarting decoder after cooldown"
            );

            tokio::select! {
                biased;
                _ = &mut *stop_rx => {
                    self.mark_stopped().await;
                    tracing::info!(camera_id = %self.camera_id, "Pipeline stopped during restart cooldown");
                    return None;
                }
                _ = tokio::time::sleep(self.config.restart_cooldown) => {}
            }

            match DecoderProcess::spawn(self.camera_id, &self.url, &self.decoder_config) {
                Ok(next) => {
                    let mut status = self.status.write().await;
                    status.health = StreamHealth::Starting;
                    status.pid = next.pid();
                    status.launches += 1;
                    return Some(next);
                }
                Err(e) => {
                    tracing::error!(
                        camera_id = %self.camera_id,
                        attempt = attempt,
                        error = %e,
                        "Decoder relaunch failed"
                    );
                }
            }
        }
    }

    async fn mark_stopped(&self) {
        let mut status = self.status.write().await;
        status.health = StreamHealth::Stopped;
        status.pid = None;
    }
}
