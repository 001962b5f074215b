//! Frame encoder - raw frame to JPEG

use crate::decoder::{FrameGeometry, RawFrame};
use crate::error::{Error, Result};
use bytes::Bytes;

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// JPEG encoder for one fixed geometry
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    geometry: FrameGeometry,
    quality: u8,
}

impl FrameEncoder {
    pub fn new(geometry: FrameGeometry, quality: u8) -> Self {
        Self {
            geometry,
            quality: quality.clamp(1, 100),
        }
    }

    /// Encode one raw frame. Pure and CPU-bound; run it off the async workers.
    pub fn encode(&self, frame: &RawFrame) -> Result<Bytes> {
        let expected = self.geometry.frame_size();
        if frame.data.len() != expected {
            return Err(Error::Encode(format!(
                "frame {} has {} bytes, expected {} ({}x{}x{})",
                frame.seq,
                frame.data.len(),
                expected,
                self.geometry.width,
                self.geometry.height,
                self.geometry.channels
            )));
        }

        let color = match self.geometry.channels {
            1 => image::ColorType::L8,
            3 => image::ColorType::Rgb8,
            n => return Err(Error::Encode(format!("unsupported channel count {}", n))),
        };

        let mut jpeg_bytes = Vec::with_capacity(expected / 8);
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_bytes, self.quality)
            .encode(
                &frame.data,
                self.geometry.width,
                self.geometry.height,
                color.into(),
            )
            .map_err(|e| Error::Encode(e.to_string()))?;

        Ok(Bytes::from(jpeg_bytes))
    }
}
