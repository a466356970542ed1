use thiserror::Error;

use crate::device::DriverError;

/// Errors surfaced to the controller.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("no depth sensor found")]
    DeviceNotFound,

    #[error("driver initialization failed: {0}")]
    DriverInit(String),

    #[error("invalid stream configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{what} {value} outside accepted range {min}..={max}")]
    OutOfRange {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("capture thread already running")]
    AlreadyRunning,

    #[error("capture thread not running")]
    NotRunning,

    #[error("device session is not open")]
    NotInitialized,

    #[error("plugin hook {hook} failed: {message}")]
    PluginHookFailure { hook: &'static str, message: String },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T, E = SensorError> = std::result::Result<T, E>;
