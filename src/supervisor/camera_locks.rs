//! Per-camera start/stop serialization
//!
//! A start and a stop of the same camera never interleave, so at most one
//! decoder process per camera exists even while an old one is terminating.

use crate::error::{Error, Result};
use crate::record_provider::CameraId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;

pub struct CameraLocks {
    locks: RwLock<HashMap<CameraId, Arc<Mutex<()>>>>,
    wait_timeout: Duration,
}

impl CameraLocks {
    pub fn with_timeout(wait_timeout: Duration) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            wait_timeout,
        }
    }

    /// Wait for exclusive control of a camera, at most `wait_timeout`.
    ///
    /// Released when the returned lease is dropped.
    pub async fn acquire(&self, camera_id: CameraId) -> Result<CameraLease> {
        let lock = self.get_or_create_lock(camera_id).await;

        match timeout(self.wait_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(camera_id = %camera_id, "Camera lock acquired");
                Ok(CameraLease {
                    camera_id,
                    _guard: guard,
                })
            }
            Err(_) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    timeout_ms = self.wait_timeout.as_millis() as u64,
                    "Camera lock timeout - start/stop in progress"
                );
                Err(Error::CameraBusy(camera_id))
            }
        }
    }

    async fn get_or_create_lock(&self, camera_id: CameraId) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&camera_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(camera_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Exclusive control of one camera's lifecycle
pub struct CameraLease {
    camera_id: CameraId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        tracing::debug!(camera_id = %self.camera_id, "Camera lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_release() {
        let locks = CameraLocks::with_timeout(Duration::from_secs(5));

        let lease = locks.acquire(1).await.unwrap();
        drop(lease);

        let _again = locks.acquire(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_different_cameras_independent() {
        let locks = CameraLocks::with_timeout(Duration::from_secs(5));
        let _a = locks.acquire(1).await.unwrap();
        let _b = locks.acquire(2).await.unwrap();
    }

    #[tokio::test]
    async fn test_busy_after_timeout() {
        let locks = CameraLocks::with_timeout(Duration::from_millis(100));
        let _held = locks.acquire(1).await.unwrap();

        assert!(matches!(locks.acquire(1).await, Err(Error::CameraBusy(1))));
    }
}
