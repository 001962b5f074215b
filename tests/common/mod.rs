//! Shared helpers for supervisor integration tests

#![allow(dead_code)]

use multicam_streamer::admission_controller::{AdmissionController, AdmissionPolicy};
use multicam_streamer::decoder::{DecoderCommand, DecoderConfig, FrameGeometry};
use multicam_streamer::encoder::FrameEncoder;
use multicam_streamer::record_provider::{Camera, Inventory, RecordProvider};
use multicam_streamer::state::SystemHealth;
use multicam_streamer::supervisor::{PipelineStatus, StreamSupervisor, SupervisorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Emits a 2x2 rgb frame every 50 ms
pub const FRAMES: &str = r#"while :; do printf "%012d" 0; sleep 0.05; done"#;

/// Never writes anything
pub const SILENT: &str = "exec sleep 30";

pub fn geometry() -> FrameGeometry {
    FrameGeometry::rgb(2, 2)
}

pub fn camera(id: i64, section_id: i64) -> Camera {
    Camera {
        id,
        name: format!("cam-{}", id),
        ip_address: "127.0.0.1".to_string(),
        port: 554,
        username: None,
        password: None,
        is_active: true,
        section_id: Some(section_id),
        stream_path: None,
    }
}

pub fn inventory(sections: &[(i64, &[i64])]) -> Inventory {
    let mut inv = Inventory::default();
    for (section_id, camera_ids) in sections {
        inv.sections.push(
            serde_json::from_value(serde_json::json!({"id": section_id, "name": format!("section-{}", section_id)}))
                .unwrap(),
        );
        for id in camera_ids.iter() {
            inv.cameras.push(camera(*id, *section_id));
        }
    }
    inv
}

pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        frame_timeout: Duration::from_millis(500),
        read_timeout: Duration::from_millis(100),
        restart_cooldown: Duration::from_millis(100),
        max_restart_attempts: 2,
        stop_timeout: Duration::from_secs(3),
        camera_lock_timeout: Duration::from_secs(5),
    }
}

pub fn script_decoder(script: &str) -> DecoderConfig {
    DecoderConfig {
        command: DecoderCommand::new("sh", ["-c", script]),
        geometry: geometry(),
        fps: 5,
        stop_grace: Duration::from_millis(500),
    }
}

pub fn supervisor_with(
    inventory: Inventory,
    script: &str,
    max_pipelines: usize,
    config: SupervisorConfig,
) -> Arc<StreamSupervisor> {
    let health = Arc::new(RwLock::new(SystemHealth::default()));
    let admission = AdmissionController::new(
        AdmissionPolicy {
            max_pipelines,
            reject_on_overload: true,
        },
        health,
    );
    Arc::new(StreamSupervisor::new(
        Arc::new(RecordProvider::in_memory(inventory)),
        Arc::new(admission),
        script_decoder(script),
        FrameEncoder::new(geometry(), 80),
        config,
    ))
}

pub fn supervisor(inventory: Inventory, script: &str, max_pipelines: usize) -> Arc<StreamSupervisor> {
    supervisor_with(inventory, script, max_pipelines, fast_config())
}

/// Unique file that spawned scripts append their pid to
pub fn marker_file() -> PathBuf {
    std::env::temp_dir().join(format!("multicam-spawn-{}.log", uuid::Uuid::new_v4()))
}

/// Script that records its pid in `marker`, then behaves like `body`
pub fn recording(marker: &PathBuf, body: &str) -> String {
    format!("echo $$ >> {}; {}", marker.display(), body)
}

pub fn spawn_count(marker: &PathBuf) -> usize {
    std::fs::read_to_string(marker)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

pub fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

/// Poll `check` every 20 ms until it holds or `within` elapses
pub async fn wait_until(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll the pipeline status of `camera_id` until `pred` holds
pub async fn wait_for_status(
    sup: &StreamSupervisor,
    camera_id: i64,
    within: Duration,
    pred: impl Fn(&PipelineStatus) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let matched = sup
            .snapshot()
            .await
            .iter()
            .any(|v| v.status.camera_id == camera_id && pred(&v.status));
        if matched {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
