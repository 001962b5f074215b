//! AdmissionController - pipeline admission
//!
//! ## Responsibilities
//!
//! - Enforce the concurrency cap on decoder pipelines
//! - Refuse new pipelines while the host is overloaded
//!
//! Running pipelines are never affected; only new starts are rejected.
//! The caller must hold the registry write lock across `admit` and the
//! insert that follows, so the count cannot race.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::state::SystemHealth;
use std::sync::Arc;
use tokio::sync::RwLock;

/// AdmissionController instance
pub struct AdmissionController {
    policy: AdmissionPolicy,
    system_health: Arc<RwLock<SystemHealth>>,
}

impl AdmissionController {
    /// Create new AdmissionController
    pub fn new(policy: AdmissionPolicy, system_health: Arc<RwLock<SystemHealth>>) -> Self {
        Self {
            policy,
            system_health,
        }
    }

    pub fn max_pipelines(&self) -> usize {
        self.policy.max_pipelines
    }

    /// Decide whether one more pipeline may start given `live` running ones
    pub async fn can_admit(&self, live: usize) -> AdmissionResult {
        if live >= self.policy.max_pipelines {
            return AdmissionResult::Rejected(RejectReason::OverCapacity {
                limit: self.policy.max_pipelines,
            });
        }

        if self.policy.reject_on_overload {
            let health = self.system_health.read().await;
            if health.overloaded {
                return AdmissionResult::Rejected(RejectReason::SystemOverload {
                    cpu_percent: health.cpu_percent,
                    memory_percent: health.memory_percent,
                });
            }
        }

        AdmissionResult::Admitted
    }

    /// `can_admit` mapped onto the error taxonomy
    pub async fn admit(&self, live: usize) -> Result<()> {
        match self.can_admit(live).await {
            AdmissionResult::Admitted => Ok(()),
            AdmissionResult::Rejected(RejectReason::OverCapacity { limit }) => {
                tracing::warn!(live = live, limit = limit, "Pipeline rejected: capacity reached");
                Err(Error::CapacityExceeded { limit })
            }
            AdmissionResult::Rejected(RejectReason::SystemOverload {
                cpu_percent,
                memory_percent,
            }) => {
                tracing::warn!(
                    cpu_percent = cpu_percent,
                    memory_percent = memory_percent,
                    "Pipeline rejected: system overloaded"
                );
                Err(Error::SystemOverload {
                    cpu_percent,
                    memory_percent,
                })
            }
        }
    }

    /// Get admission status
    pub async fn get_status(&self) -> AdmissionStatus {
        let health = self.system_health.read().await;
        AdmissionStatus {
            healthy: !health.overloaded,
            cpu_percent: health.cpu_percent,
            memory_percent: health.memory_percent,
            max_pipelines: self.policy.max_pipelines,
        }
    }
}
