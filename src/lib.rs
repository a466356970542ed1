pub mod algorithm;
pub mod capture;
pub mod device;
pub mod error;
pub mod sensor;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use algorithm::{AlgorithmPlugin, AlgorithmSlot, SharedAlgorithm};
pub use capture::{CaptureState, Frame, StatsSnapshot, StreamKind};
pub use device::{ColorMode, DepthFormat, DepthMode, Driver, LedState, Resolution, StreamSet};
pub use error::{Result, SensorError};
pub use sensor::DepthSensor;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Environment variables with this prefix override file settings,
/// e.g. `DEPTHLINK__CAPTURE__PUMP_TIMEOUT_MS=5`
pub const ENV_PREFIX: &str = "DEPTHLINK";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Enumeration index of the sensor to open
    pub index: usize,
    pub depth: DepthMode,
    pub color: ColorMode,
    /// LED state applied once the device is open
    pub led: LedState,
    /// Tilt applied once the device is open
    pub tilt_degrees: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub depth: bool,
    pub color: bool,
    /// Upper bound on a single driver event wait
    pub pump_timeout_ms: u64,
    /// Pause after a failed event pump
    pub error_backoff_ms: u64,
    /// Pin the capture thread to this CPU core
    pub cpu_core: Option<usize>,
}

impl CaptureConfig {
    pub fn streams(&self) -> StreamSet {
        StreamSet {
            depth: self.depth,
            color: self.color,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                index: 0,
                depth: DepthMode::default(),
                color: ColorMode::default(),
                led: LedState::Green,
                tilt_degrees: None,
            },
            capture: CaptureConfig {
                depth: true,
                color: true,
                pump_timeout_ms: 10,
                error_backoff_ms: 10,
                cpu_core: None,
            },
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `DEPTHLINK__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
