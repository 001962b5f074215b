//! AdmissionController types

use serde::{Deserialize, Serialize};

/// Admission policy for new pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    /// Maximum number of live (not Stopped) pipelines.
    ///
    /// Unresponsive pipelines waiting out a restart cooldown still hold a slot.
    pub max_pipelines: usize,
    /// Refuse new pipelines while the host is overloaded
    pub reject_on_overload: bool,
}

/// Admission result
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionResult {
    Admitted,
    Rejected(RejectReason),
}

/// Rejection reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    SystemOverload { cpu_percent: f32, memory_percent: f32 },
    OverCapacity { limit: usize },
}

/// Admission status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub healthy: bool,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub max_pipelines: usize,
}
