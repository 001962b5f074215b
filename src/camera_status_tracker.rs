//! Camera Status Tracker
//!
//! Tracks camera reachability to detect lost/recovered transitions.
//! Only transitions are logged, so periodic probing does not spam the log.

use crate::record_provider::CameraId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraConnectionStatus {
    /// Never probed
    Unknown,
    Online,
    Offline,
}

/// Camera status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatusEvent {
    /// Online → Offline, or first probe failed
    Lost,
    /// Offline → Online
    Recovered,
}

/// Tracks camera connection status and detects transitions
pub struct CameraStatusTracker {
    statuses: RwLock<HashMap<CameraId, CameraConnectionStatus>>,
}

impl CameraStatusTracker {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Record a probe result and return the transition it caused, if any
    pub async fn update_status(
        &self,
        camera_id: CameraId,
        is_online: bool,
    ) -> Option<CameraStatusEvent> {
        let new_status = if is_online {
            CameraConnectionStatus::Online
        } else {
            CameraConnectionStatus::Offline
        };

        let prev = self
            .statuses
            .write()
            .await
            .insert(camera_id, new_status)
            .unwrap_or(CameraConnectionStatus::Unknown);

        match (prev, new_status) {
            (CameraConnectionStatus::Online, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera_id = %camera_id, "Camera connection lost");
                Some(CameraStatusEvent::Lost)
            }
            (CameraConnectionStatus::Unknown, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera_id = %camera_id, "Camera unreachable on first probe");
                Some(CameraStatusEvent::Lost)
            }
            (CameraConnectionStatus::Offline, CameraConnectionStatus::Online) => {
                tracing::info!(camera_id = %camera_id, "Camera connection recovered");
                Some(CameraStatusEvent::Recovered)
            }
            _ => None,
        }
    }

    pub async fn get_offline_cameras(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self
            .statuses
            .read()
            .await
            .iter()
            .filter(|(_, status)| **status == CameraConnectionStatus::Offline)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Forget cameras no longer in the inventory
    pub async fn retain(&self, known: &[CameraId]) {
        self.statuses
            .write()
            .await
            .retain(|id, _| known.contains(id));
    }
}
