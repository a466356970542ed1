use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two independent data channels of the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Depth,
    Color,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Depth, StreamKind::Color];

    /// Depth is one u16 per pixel, color one RGB triple
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            StreamKind::Depth => 2,
            StreamKind::Color => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Color => "color",
        }
    }

    pub fn partner(self) -> StreamKind {
        match self {
            StreamKind::Depth => StreamKind::Color,
            StreamKind::Color => StreamKind::Depth,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("{kind:?} payload is {actual} bytes, expected {expected}")]
    PayloadSize {
        kind: StreamKind,
        expected: usize,
        actual: usize,
    },

    #[error("{kind:?} frame of {actual} bytes exceeds buffer capacity {capacity}")]
    CapacityExceeded {
        kind: StreamKind,
        capacity: usize,
        actual: usize,
    },

    #[error("{actual:?} frame written to {expected:?} buffer")]
    KindMismatch {
        expected: StreamKind,
        actual: StreamKind,
    },
}

/// Frame as handed over by the driver callback. The payload points into
/// driver-owned memory and is only valid for the duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub kind: StreamKind,
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub timestamp: u32,
}

/// Immutable captured image
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Host capture time for latency tracking
    pub timestamp: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub kind: StreamKind,
    /// Per-kind counter assigned by the capture thread
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// Driver timestamp in device clock ticks
    pub device_timestamp: u32,
}

impl Frame {
    pub fn new(
        kind: StreamKind,
        width: u32,
        height: u32,
        data: Bytes,
        sequence: u64,
        device_timestamp: u32,
    ) -> Result<Self, FrameError> {
        let stride = width as usize * kind.bytes_per_pixel();
        let expected = stride * height as usize;
        if data.len() != expected {
            return Err(FrameError::PayloadSize {
                kind,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            meta: Arc::new(FrameMetadata {
                kind,
                sequence,
                width,
                height,
                stride: stride as u32,
                device_timestamp,
            }),
            timestamp: Instant::now(),
        })
    }

    /// Copy a driver frame out of driver memory.
    pub fn from_raw(raw: &RawFrame<'_>, sequence: u64) -> Result<Self, FrameError> {
        Self::new(
            raw.kind,
            raw.width,
            raw.height,
            Bytes::copy_from_slice(raw.data),
            sequence,
            raw.timestamp,
        )
    }

    pub fn kind(&self) -> StreamKind {
        self.meta.kind
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.meta.width, self.meta.height)
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// Depth samples in millimeters, or `None` for a color frame.
    ///
    /// Borrows the payload when it is suitably aligned and decodes a copy
    /// otherwise.
    pub fn depth_samples(&self) -> Option<Cow<'_, [u16]>> {
        if self.kind() != StreamKind::Depth {
            return None;
        }

        Some(match bytemuck::try_cast_slice::<u8, u16>(&self.data) {
            Ok(samples) => Cow::Borrowed(samples),
            Err(_) => Cow::Owned(
                self.data
                    .chunks_exact(2)
                    .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                    .collect(),
            ),
        })
    }

    /// Packed RGB triples, or `None` for a depth frame.
    pub fn rgb(&self) -> Option<&[u8]> {
        match self.kind() {
            StreamKind::Color => Some(&self.data),
            StreamKind::Depth => None,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("bytes", &self.data.len())
            .finish()
    }
}
