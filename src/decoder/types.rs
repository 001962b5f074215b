//! Decoder types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed output geometry of a decoder process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel: 3 = rgb24, 1 = gray
    pub channels: u8,
}

impl FrameGeometry {
    pub fn rgb(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 3,
        }
    }

    /// Exact byte length of one raw frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// ffmpeg `-pix_fmt` matching the channel count
    pub fn pix_fmt(&self) -> &'static str {
        match self.channels {
            1 => "gray",
            _ => "rgb24",
        }
    }
}

/// One decoded frame, exactly `geometry.frame_size()` bytes
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Per-process capture sequence
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
    pub geometry: FrameGeometry,
    pub data: Vec<u8>,
}

/// Result of a bounded frame read
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete frame
    Frame(RawFrame),
    /// Deadline passed before a full frame arrived; partial bytes are kept
    Incomplete,
    /// Output stream closed (process exited or pipe broken)
    EndOfStream,
}

/// Result of terminating a decoder process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Process was running and has been stopped and reaped
    Terminated,
    /// Process had already exited
    AlreadyStopped,
}
