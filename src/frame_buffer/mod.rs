//! FrameBuffer - latest encoded frame per camera
//!
//! Single-slot buffer built on `tokio::sync::watch`: the pipeline task owns
//! the `FramePublisher`, readers hold cheap `FrameBuffer` clones.
//!
//! - publish never blocks on readers (`send_replace`)
//! - readers always see a whole frame (the slot holds an immutable `Bytes`)
//! - dropping the publisher closes the buffer, ending every waiting reader

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// A complete JPEG image ready for delivery
#[derive(Debug, Clone, Serialize)]
pub struct EncodedFrame {
    /// Strictly increasing per pipeline, never reset across decoder restarts
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
    #[serde(skip)]
    pub data: Bytes,
}

/// Create a connected publisher / reader pair
pub fn frame_buffer() -> (FramePublisher, FrameBuffer) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx, next_seq: 0 }, FrameBuffer { rx })
}

/// Write side, owned by exactly one pipeline task
pub struct FramePublisher {
    tx: watch::Sender<Option<EncodedFrame>>,
    next_seq: u64,
}

impl FramePublisher {
    /// Replace the current frame. Returns the sequence number assigned.
    pub fn publish(&mut self, data: Bytes, captured_at: DateTime<Utc>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tx.send_replace(Some(EncodedFrame {
            seq,
            captured_at,
            data,
        }));
        seq
    }

    pub fn published(&self) -> u64 {
        self.next_seq
    }
}

/// Read side, cloned freely for every viewer
#[derive(Clone)]
pub struct FrameBuffer {
    rx: watch::Receiver<Option<EncodedFrame>>,
}

impl FrameBuffer {
    /// Most recent frame, `None` before the first publish
    pub fn latest(&self) -> Option<EncodedFrame> {
        self.rx.borrow().clone()
    }

    /// Independent change-tracking receiver for one viewer
    pub fn subscribe(&self) -> watch::Receiver<Option<EncodedFrame>> {
        self.rx.clone()
    }
}
