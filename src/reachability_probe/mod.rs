//! ReachabilityProbe - periodic camera reachability report
//!
//! Side channel independent of streaming: every active camera's RTSP port
//! is probed with a TCP connect, transitions are tracked, and the resulting
//! report is logged and kept for the API. Supervisor state is never touched.

use crate::camera_status_tracker::{CameraStatusEvent, CameraStatusTracker};
use crate::error::Result;
use crate::record_provider::{Camera, CameraId, RecordProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// Probe result of one camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraProbe {
    pub camera_id: CameraId,
    pub name: String,
    pub target: String,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<CameraStatusEvent>,
}

/// One probe run
#[derive(Debug, Clone, Serialize)]
pub struct ReachabilityReport {
    pub checked_at: DateTime<Utc>,
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    /// Active cameras currently offline, by id
    pub offline_ids: Vec<CameraId>,
    pub cameras: Vec<CameraProbe>,
}

pub struct ReachabilityProbe {
    records: Arc<RecordProvider>,
    tracker: CameraStatusTracker,
    connect_timeout: Duration,
    latest: RwLock<Option<ReachabilityReport>>,
}

impl ReachabilityProbe {
    pub fn new(records: Arc<RecordProvider>, connect_timeout: Duration) -> Self {
        Self {
            records,
            tracker: CameraStatusTracker::new(),
            connect_timeout,
            latest: RwLock::new(None),
        }
    }

    pub async fn latest(&self) -> Option<ReachabilityReport> {
        self.latest.read().await.clone()
    }

    async fn is_reachable(&self, camera: &Camera) -> bool {
        matches!(
            timeout(self.connect_timeout, TcpStream::connect(camera.socket_target())).await,
            Ok(Ok(_))
        )
    }

    /// Probe every active camera once
    pub async fn run_once(&self) -> Result<ReachabilityReport> {
        let cameras = self.records.list_active_cameras().await?;

        let results =
            futures::future::join_all(cameras.iter().map(|camera| self.is_reachable(camera)))
                .await;

        let mut probes = Vec::with_capacity(cameras.len());
        for (camera, online) in cameras.iter().zip(results) {
            let event = self.tracker.update_status(camera.id, online).await;
            probes.push(CameraProbe {
                camera_id: camera.id,
                name: camera.name.clone(),
                target: camera.socket_target(),
                online,
                event,
            });
        }

        let known: Vec<CameraId> = cameras.iter().map(|c| c.id).collect();
        self.tracker.retain(&known).await;

        let online = probes.iter().filter(|p| p.online).count();
        let report = ReachabilityReport {
            checked_at: Utc::now(),
            total: probes.len(),
            online,
            offline: probes.len() - online,
            offline_ids: self.tracker.get_offline_cameras().await,
            cameras: probes,
        };

        if report.offline > 0 {
            tracing::warn!(
                total = report.total,
                offline = report.offline,
                offline_ids = ?report.offline_ids,
                "Reachability report: cameras offline"
            );
        } else {
            tracing::info!(total = report.total, "Reachability report: all cameras online");
        }

        *self.latest.write().await = Some(report.clone());
        Ok(report)
    }
}
