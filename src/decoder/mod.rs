//! Decoder process adapter
//!
//! Wraps one external decoder process (ffmpeg by default) that pulls a
//! camera stream and writes fixed-size raw frames to stdout.
//!
//! ## Guarantees
//!
//! - `read_frame` is bounded by a deadline and never blocks past it
//! - Partial frames survive a deadline, so frame alignment is never lost
//! - `terminate` always reaps the child; `kill_on_drop` covers abandoned handles

mod command;
mod types;

pub use command::{DecoderCommand, DecoderConfig};
pub use types::*;

use crate::error::{Error, Result};
use crate::record_provider::CameraId;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{timeout, timeout_at, Instant};

/// A running decoder process for one camera
pub struct DecoderProcess {
    camera_id: CameraId,
    child: Child,
    stdout: Option<ChildStdout>,
    geometry: FrameGeometry,
    buf: Vec<u8>,
    filled: usize,
    next_seq: u64,
    pid: Option<u32>,
    stop_grace: Duration,
}

impl DecoderProcess {
    /// Launch the decoder for `url`.
    ///
    /// Returns `Error::Launch` when the executable cannot be started.
    pub fn spawn(camera_id: CameraId, url: &str, config: &DecoderConfig) -> Result<Self> {
        let args = config
            .command
            .render_args(url, &config.geometry, config.fps);

        let mut child = Command::new(&config.command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Launch {
                camera_id,
                message: format!("{}: {}", config.command.program, e),
            })?;

        let stdout = child.stdout.take();
        if stdout.is_none() {
            return Err(Error::Launch {
                camera_id,
                message: "decoder stdout not captured".to_string(),
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(camera_id = %camera_id, line = %line, "decoder stderr");
                }
            });
        }

        let pid = child.id();
        tracing::debug!(
            camera_id = %camera_id,
            pid = ?pid,
            program = %config.command.program,
            "Decoder process spawned"
        );

        Ok(Self {
            camera_id,
            child,
            stdout,
            geometry: config.geometry,
            buf: vec![0; config.geometry.frame_size()],
            filled: 0,
            next_seq: 0,
            pid,
            stop_grace: config.stop_grace,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Read exactly one frame, waiting at most `wait`.
    ///
    /// Cancel safe: dropping the future keeps already received bytes.
    pub async fn read_frame(&mut self, wait: Duration) -> ReadOutcome {
        let deadline = Instant::now() + wait;
        let frame_size = self.geometry.frame_size();
        let mut closed = false;

        if let Some(stdout) = self.stdout.as_mut() {
            while self.filled < frame_size {
                match timeout_at(deadline, stdout.read(&mut self.buf[self.filled..])).await {
                    Err(_) => return ReadOutcome::Incomplete,
                    Ok(Ok(0)) => {
                        closed = true;
                        break;
                    }
                    Ok(Ok(n)) => self.filled += n,
                    Ok(Err(e)) => {
                        tracing::warn!(
                            camera_id = %self.camera_id,
                            error = %e,
                            "Decoder stdout read failed"
                        );
                        closed = true;
                        break;
                    }
                }
            }
        } else {
            closed = true;
        }

        if closed {
            self.stdout = None;
            return ReadOutcome::EndOfStream;
        }

        self.filled = 0;
        let seq = self.next_seq;
        self.next_seq += 1;

        ReadOutcome::Frame(RawFrame {
            seq,
            captured_at: chrono::Utc::now(),
            geometry: self.geometry,
            data: std::mem::replace(&mut self.buf, vec![0; frame_size]),
        })
    }

    /// Stop the process: SIGTERM, then SIGKILL after the grace period.
    pub async fn terminate(mut self) -> TerminateOutcome {
        self.stdout = None;

        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(
                    camera_id = %self.camera_id,
                    pid = ?self.pid,
                    status = %status,
                    "Decoder already exited"
                );
                return TerminateOutcome::AlreadyStopped;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(camera_id = %self.camera_id, error = %e, "Decoder status check failed");
            }
        }

        send_sigterm(&self.child);

        match timeout(self.stop_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(
                    camera_id = %self.camera_id,
                    pid = ?self.pid,
                    status = %status,
                    "Decoder terminated"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(camera_id = %self.camera_id, error = %e, "Decoder wait failed");
                self.force_kill().await;
            }
            Err(_) => {
                tracing::warn!(
                    camera_id = %self.camera_id,
                    pid = ?self.pid,
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "Decoder ignored SIGTERM, killing"
                );
                self.force_kill().await;
            }
        }

        TerminateOutcome::Terminated
    }

    async fn force_kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::error!(
                camera_id = %self.camera_id,
                pid = ?self.pid,
                error = %e,
                "Failed to kill decoder"
            );
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid is our own unreaped child, so it cannot have been recycled.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {}

/// Check that the decoder executable runs (`<program> -version`)
pub async fn check_decoder(program: &str) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .await
        .map_err(|e| Error::Internal(format!("{} not found: {}", program, e)))?;

    if !output.status.success() {
        return Err(Error::Internal(format!("{} version check failed", program)));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let first_line = version.lines().next().unwrap_or("unknown");
    Ok(first_line.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn script(body: &str) -> DecoderConfig {
        DecoderConfig {
            command: DecoderCommand::new("sh", ["-c", body]),
            geometry: FrameGeometry::rgb(2, 2),
            fps: 5,
            stop_grace: Duration::from_millis(500),
        }
    }

    fn process_exists(pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[tokio::test]
    async fn test_reads_whole_frames_then_end_of_stream() {
        let mut decoder =
            DecoderProcess::spawn(1, "unused", &script(r#"printf "%024d" 0"#)).unwrap();

        for expected_seq in 0..2 {
            match decoder.read_frame(Duration::from_secs(2)).await {
                ReadOutcome::Frame(frame) => {
                    assert_eq!(frame.seq, expected_seq);
                    assert_eq!(frame.data.len(), 12);
                }
                other => panic!("expected frame, got {:?}", other),
            }
        }
        assert!(matches!(
            decoder.read_frame(Duration::from_secs(2)).await,
            ReadOutcome::EndOfStream
        ));
    }

    #[tokio::test]
    async fn test_partial_frame_is_incomplete_then_completes() {
        let config = script(r#"printf 000000; sleep 0.5; printf 000000; exec sleep 5"#);
        let mut decoder = DecoderProcess::spawn(1, "unused", &config).unwrap();

        assert!(matches!(
            decoder.read_frame(Duration::from_millis(100)).await,
            ReadOutcome::Incomplete
        ));

        let mut frame = None;
        for _ in 0..30 {
            if let ReadOutcome::Frame(f) = decoder.read_frame(Duration::from_millis(100)).await {
                frame = Some(f);
                break;
            }
        }
        let frame = frame.expect("frame after second write");
        assert_eq!(frame.seq, 0);
        assert!(frame.data.iter().all(|b| *b == b'0'));

        decoder.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_running_process() {
        let decoder = DecoderProcess::spawn(1, "unused", &script("exec sleep 30")).unwrap();
        let pid = decoder.pid().unwrap();
        assert!(process_exists(pid));

        assert_eq!(decoder.terminate().await, TerminateOutcome::Terminated);
        assert!(!process_exists(pid));
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let mut decoder = DecoderProcess::spawn(1, "unused", &script("exit 0")).unwrap();
        assert!(matches!(
            decoder.read_frame(Duration::from_secs(2)).await,
            ReadOutcome::EndOfStream
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(decoder.terminate().await, TerminateOutcome::AlreadyStopped);
    }

    #[tokio::test]
    async fn test_sigkill_after_grace() {
        let config = script(r#"trap "" TERM; while :; do sleep 0.1; done"#);
        let decoder = DecoderProcess::spawn(1, "unused", &config).unwrap();
        let pid = decoder.pid().unwrap();

        assert_eq!(decoder.terminate().await, TerminateOutcome::Terminated);
        assert!(!process_exists(pid));
    }

    #[tokio::test]
    async fn test_launch_error() {
        let config = DecoderConfig {
            command: DecoderCommand::new("/nonexistent/decoder", Vec::<String>::new()),
            ..script("")
        };
        assert!(matches!(
            DecoderProcess::spawn(5, "rtsp://x", &config),
            Err(Error::Launch { camera_id: 5, .. })
        ));
    }
}
