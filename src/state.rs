//! Application state
//!
//! Holds all shared components and state

use crate::admission_controller::{AdmissionController, AdmissionPolicy};
use crate::decoder::{DecoderCommand, DecoderConfig, FrameGeometry};
use crate::encoder::{FrameEncoder, DEFAULT_JPEG_QUALITY};
use crate::error::{Error, Result};
use crate::reachability_probe::ReachabilityProbe;
use crate::record_provider::RecordProvider;
use crate::supervisor::{StreamSupervisor, SupervisorConfig};
use crate::viewer_feed::FeedConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// MySQL registry; the JSON inventory is used when unset
    pub database_url: Option<String>,
    /// JSON inventory file
    pub inventory_file: PathBuf,
    /// Decoder executable
    pub decoder_program: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_fps: u32,
    pub jpeg_quality: u8,
    pub max_pipelines: usize,
    pub frame_timeout: Duration,
    pub read_timeout: Duration,
    pub restart_cooldown: Duration,
    pub max_restart_attempts: u32,
    pub stop_grace: Duration,
    pub camera_lock_timeout: Duration,
    pub feed_max_fps: u32,
    /// A viewer waiting for the first frame gives up after this long
    pub feed_idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Zero disables the reachability side channel
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    /// Prefix of feed URLs returned by multi_stream
    pub feed_path_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: None,
            inventory_file: PathBuf::from("inventory.json"),
            decoder_program: "ffmpeg".to_string(),
            frame_width: 640,
            frame_height: 480,
            frame_fps: 5,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_pipelines: 10,
            frame_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_millis(1000),
            restart_cooldown: Duration::from_secs(5),
            max_restart_attempts: 3,
            stop_grace: Duration::from_millis(2000),
            camera_lock_timeout: Duration::from_millis(5000),
            feed_max_fps: 5,
            feed_idle_timeout: Duration::from_secs(20),
            sweep_interval: Duration::from_secs(10),
            probe_interval: Duration::from_secs(3600),
            probe_timeout: Duration::from_millis(3000),
            feed_path_prefix: "/api/video_feed".to_string(),
        }
    }
}

/// Parse `key` if set, otherwise keep `default`
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_millis() as u64).map(Duration::from_millis)
}

impl AppConfig {
    /// Read configuration from the environment, defaults for unset keys
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let config = Self {
            host: env_or("HOST", d.host)?,
            port: env_or("PORT", d.port)?,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            inventory_file: env_or("INVENTORY_FILE", d.inventory_file)?,
            decoder_program: env_or("DECODER_PROGRAM", d.decoder_program)?,
            frame_width: env_or("FRAME_WIDTH", d.frame_width)?,
            frame_height: env_or("FRAME_HEIGHT", d.frame_height)?,
            frame_fps: env_or("FRAME_FPS", d.frame_fps)?,
            jpeg_quality: env_or("JPEG_QUALITY", d.jpeg_quality)?,
            max_pipelines: env_or("MAX_PIPELINES", d.max_pipelines)?,
            frame_timeout: env_secs("FRAME_TIMEOUT_SEC", d.frame_timeout)?,
            read_timeout: env_millis("READ_TIMEOUT_MS", d.read_timeout)?,
            restart_cooldown: env_secs("RESTART_COOLDOWN_SEC", d.restart_cooldown)?,
            max_restart_attempts: env_or("MAX_RESTART_ATTEMPTS", d.max_restart_attempts)?,
            stop_grace: env_millis("STOP_GRACE_MS", d.stop_grace)?,
            camera_lock_timeout: env_millis("CAMERA_LOCK_TIMEOUT_MS", d.camera_lock_timeout)?,
            feed_max_fps: env_or("FEED_MAX_FPS", d.feed_max_fps)?,
            feed_idle_timeout: env_secs("FEED_IDLE_TIMEOUT_SEC", d.feed_idle_timeout)?,
            sweep_interval: env_secs("SWEEP_INTERVAL_SEC", d.sweep_interval)?,
            probe_interval: env_secs("PROBE_INTERVAL_SEC", d.probe_interval)?,
            probe_timeout: env_millis("PROBE_TIMEOUT_MS", d.probe_timeout)?,
            feed_path_prefix: env_or("FEED_PATH_PREFIX", d.feed_path_prefix)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(Error::Config("frame geometry must be non-zero".to_string()));
        }
        if self.frame_fps == 0 {
            return Err(Error::Config("FRAME_FPS must be positive".to_string()));
        }
        if self.max_pipelines == 0 {
            return Err(Error::Config("MAX_PIPELINES must be positive".to_string()));
        }
        if self.read_timeout.is_zero() || self.read_timeout > self.frame_timeout {
            return Err(Error::Config(
                "READ_TIMEOUT_MS must be positive and not exceed FRAME_TIMEOUT_SEC".to_string(),
            ));
        }
        Ok(())
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::rgb(self.frame_width, self.frame_height)
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            command: DecoderCommand::ffmpeg(self.decoder_program.clone()),
            geometry: self.geometry(),
            fps: self.frame_fps,
            stop_grace: self.stop_grace,
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            frame_timeout: self.frame_timeout,
            read_timeout: self.read_timeout,
            restart_cooldown: self.restart_cooldown,
            max_restart_attempts: self.max_restart_attempts,
            stop_timeout: self.stop_grace + Duration::from_secs(3),
            camera_lock_timeout: self.camera_lock_timeout,
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            max_fps: self.feed_max_fps,
            idle_timeout: self.feed_idle_timeout,
        }
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            max_pipelines: self.max_pipelines,
            reject_on_overload: true,
        }
    }

    /// Feed URL advertised for a camera
    pub fn feed_url(&self, camera_id: crate::record_provider::CameraId) -> String {
        format!("{}/{}", self.feed_path_prefix.trim_end_matches('/'), camera_id)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Site / section / camera records
    pub records: Arc<RecordProvider>,
    /// AdmissionController
    pub admission: Arc<AdmissionController>,
    /// StreamSupervisor (decoder pipelines)
    pub supervisor: Arc<StreamSupervisor>,
    /// ReachabilityProbe (side channel)
    pub reachability: Arc<ReachabilityProbe>,
    /// System health status
    pub system_health: Arc<RwLock<SystemHealth>>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire all components from config and a record provider
    pub fn build(config: AppConfig, records: Arc<RecordProvider>) -> Self {
        let decoder_config = config.decoder_config();
        Self::build_with_decoder(config, records, decoder_config)
    }

    /// Same as `build` with an explicit decoder invocation
    pub fn build_with_decoder(
        config: AppConfig,
        records: Arc<RecordProvider>,
        decoder_config: DecoderConfig,
    ) -> Self {
        let system_health = Arc::new(RwLock::new(SystemHealth::default()));
        let admission = Arc::new(AdmissionController::new(
            config.admission_policy(),
            system_health.clone(),
        ));
        let supervisor = Arc::new(StreamSupervisor::new(
            records.clone(),
            admission.clone(),
            decoder_config,
            FrameEncoder::new(config.geometry(), config.jpeg_quality),
            config.supervisor_config(),
        ));
        let reachability = Arc::new(ReachabilityProbe::new(records.clone(), config.probe_timeout));

        Self {
            config,
            records,
            admission,
            supervisor,
            reachability,
            system_health,
            started_at: Instant::now(),
        }
    }
}

/// System health metrics
#[derive(Debug, Clone, Default)]
pub struct SystemHealth {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub overloaded: bool,
    pub last_overload_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SystemHealth {
    /// Check and update overload status
    pub fn update(&mut self, cpu: f32, memory: f32) {
        self.cpu_percent = cpu;
        self.memory_percent = memory;

        if cpu > 85.0 || memory > 90.0 {
            if !self.overloaded {
                tracing::warn!(cpu_percent = cpu, memory_percent = memory, "System overloaded");
            }
            self.overloaded = true;
            self.last_overload_at = Some(chrono::Utc::now());
        } else if self.overloaded {
            // Recovery with hysteresis
            if let Some(last) = self.last_overload_at {
                let elapsed = chrono::Utc::now() - last;
                if elapsed > chrono::Duration::seconds(60) && cpu < 60.0 && memory < 70.0 {
                    self.overloaded = false;
                    tracing::info!(cpu_percent = cpu, memory_percent = memory, "System load recovered");
                }
            }
        }
    }
}
