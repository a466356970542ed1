//! Stream modes and actuator settings negotiated with the driver

use serde::{Deserialize, Serialize};

use crate::capture::frame::StreamKind;
use crate::error::{Result, SensorError};

/// Sensor resolutions exposed by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Low,
    Medium,
    High,
}

impl Resolution {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Low => (320, 240),
            Resolution::Medium => (640, 480),
            Resolution::High => (1280, 1024),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFormat {
    /// Distance in millimeters, 0 where the sensor got no return
    Millimeters,
    /// Millimeters, re-projected onto the color camera's viewpoint
    Registered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMode {
    pub resolution: Resolution,
    pub format: DepthFormat,
}

impl Default for DepthMode {
    fn default() -> Self {
        Self {
            resolution: Resolution::Medium,
            format: DepthFormat::Millimeters,
        }
    }
}

impl DepthMode {
    pub fn frame_bytes(&self) -> usize {
        let (width, height) = self.resolution.dimensions();
        width as usize * height as usize * StreamKind::Depth.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMode {
    pub resolution: Resolution,
}

impl Default for ColorMode {
    fn default() -> Self {
        Self {
            resolution: Resolution::Medium,
        }
    }
}

impl ColorMode {
    pub fn frame_bytes(&self) -> usize {
        let (width, height) = self.resolution.dimensions();
        width as usize * height as usize * StreamKind::Color.bytes_per_pixel()
    }
}

/// LED options understood by the device firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedState {
    Off,
    Green,
    Red,
    Yellow,
    BlinkGreen,
    BlinkRedYellow,
}

impl LedState {
    /// Firmware code for this option. Code 5 is unused by the device.
    pub fn code(self) -> u8 {
        match self {
            LedState::Off => 0,
            LedState::Green => 1,
            LedState::Red => 2,
            LedState::Yellow => 3,
            LedState::BlinkGreen => 4,
            LedState::BlinkRedYellow => 6,
        }
    }
}

impl TryFrom<u8> for LedState {
    type Error = SensorError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(LedState::Off),
            1 => Ok(LedState::Green),
            2 => Ok(LedState::Red),
            3 => Ok(LedState::Yellow),
            4 => Ok(LedState::BlinkGreen),
            6 => Ok(LedState::BlinkRedYellow),
            other => Err(SensorError::OutOfRange {
                what: "led code",
                value: f64::from(other),
                min: 0.0,
                max: 6.0,
            }),
        }
    }
}

/// Set of stream kinds a start/stop request applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSet {
    pub depth: bool,
    pub color: bool,
}

impl StreamSet {
    pub const NONE: StreamSet = StreamSet {
        depth: false,
        color: false,
    };
    pub const DEPTH: StreamSet = StreamSet {
        depth: true,
        color: false,
    };
    pub const COLOR: StreamSet = StreamSet {
        depth: false,
        color: true,
    };
    pub const BOTH: StreamSet = StreamSet {
        depth: true,
        color: true,
    };

    pub fn contains(self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Depth => self.depth,
            StreamKind::Color => self.color,
        }
    }

    pub fn is_empty(self) -> bool {
        !self.depth && !self.color
    }

    pub fn kinds(self) -> impl Iterator<Item = StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}
