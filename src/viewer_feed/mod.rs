//! ViewerFeed - per-viewer MJPEG delivery
//!
//! Every HTTP viewer gets its own `ViewerFeed` over the camera's shared
//! frame buffer. Viewers never touch the decoder: two viewers of one camera
//! share one process.
//!
//! - a frame is emitted at most once per viewer (tracked by sequence number)
//! - emissions are spaced by at least `1 / max_fps`
//! - the feed ends when the pipeline stops and closes the buffer, or when
//!   no first frame arrives within `idle_timeout`
//! - once a frame exists, a stalled pipeline keeps the feed open: restarts
//!   stay invisible to viewers until the restart budget runs out

use crate::frame_buffer::EncodedFrame;
use crate::record_provider::CameraId;
use crate::supervisor::StreamHandle;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{unfold, Stream};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};
use uuid::Uuid;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Content-Type of the viewer response
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Per-viewer pacing and liveness
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upper bound on emitted frames per second, 0 = unpaced
    pub max_fps: u32,
    /// End the feed when the buffer stays empty this long
    pub idle_timeout: Duration,
}

impl FeedConfig {
    pub fn min_interval(&self) -> Duration {
        if self.max_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.max_fps
        }
    }
}

/// Counts a viewer against its pipeline for as long as it lives
struct ViewerGuard {
    camera_id: CameraId,
    viewer_id: Uuid,
    viewers: Arc<AtomicUsize>,
}

impl ViewerGuard {
    fn new(camera_id: CameraId, viewers: Arc<AtomicUsize>) -> Self {
        let viewer_id = Uuid::new_v4();
        let count = viewers.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            camera_id = %camera_id,
            viewer_id = %viewer_id,
            viewers = count,
            "Viewer attached"
        );
        Self {
            camera_id,
            viewer_id,
            viewers,
        }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let count = self.viewers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        tracing::debug!(
            camera_id = %self.camera_id,
            viewer_id = %self.viewer_id,
            viewers = count,
            "Viewer detached"
        );
    }
}

/// One viewer's view of a camera stream
pub struct ViewerFeed {
    frames: watch::Receiver<Option<EncodedFrame>>,
    min_interval: Duration,
    idle_timeout: Duration,
    last_seq: Option<u64>,
    next_emit: Instant,
    guard: ViewerGuard,
}

impl ViewerFeed {
    pub fn new(handle: &StreamHandle, config: &FeedConfig) -> Self {
        Self {
            frames: handle.buffer.subscribe(),
            min_interval: config.min_interval(),
            idle_timeout: config.idle_timeout,
            last_seq: None,
            next_emit: Instant::now(),
            guard: ViewerGuard::new(handle.camera_id, handle.viewers.clone()),
        }
    }

    pub fn viewer_id(&self) -> Uuid {
        self.guard.viewer_id
    }

    /// Next frame this viewer has not seen yet, or `None` when the feed ends
    pub async fn next_chunk(&mut self) -> Option<EncodedFrame> {
        sleep_until(self.next_emit).await;
        let deadline = Instant::now() + self.idle_timeout;

        loop {
            let (fresh, empty) = {
                let current = self.frames.borrow_and_update();
                let fresh = current
                    .as_ref()
                    .filter(|frame| self.last_seq.map_or(true, |seen| frame.seq > seen))
                    .cloned();
                (fresh, current.is_none())
            };

            if let Some(frame) = fresh {
                self.last_seq = Some(frame.seq);
                self.next_emit = Instant::now() + self.min_interval;
                return Some(frame);
            }

            let changed = if empty {
                match timeout_at(deadline, self.frames.changed()).await {
                    Ok(changed) => changed,
                    Err(_) => {
                        tracing::debug!(
                            camera_id = %self.guard.camera_id,
                            viewer_id = %self.guard.viewer_id,
                            idle_ms = self.idle_timeout.as_millis() as u64,
                            "Feed ended: no frame"
                        );
                        return None;
                    }
                }
            } else {
                // Stalled or restarting pipeline: wait for a frame or the close
                self.frames.changed().await
            };

            if changed.is_err() {
                tracing::debug!(
                    camera_id = %self.guard.camera_id,
                    viewer_id = %self.guard.viewer_id,
                    "Feed ended: pipeline stopped"
                );
                return None;
            }
        }
    }

    /// Body stream of multipart parts, ending with the feed
    pub fn into_multipart_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        unfold(self, |mut feed| async move {
            let frame = feed.next_chunk().await?;
            Some((Ok(multipart_part(&frame)), feed))
        })
    }
}

/// One `multipart/x-mixed-replace` part holding `frame`
pub fn multipart_part(frame: &EncodedFrame) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        frame.data.len()
    );
    let mut buf = BytesMut::with_capacity(header.len() + frame.data.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(&frame.data);
    buf.put_slice(b"\r\n");
    buf.freeze()
}
