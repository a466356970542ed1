//! Boundary to the sensor driver

use std::time::Duration;

use thiserror::Error;

use crate::capture::frame::{RawFrame, StreamKind};
use crate::device::mode::{ColorMode, DepthMode, LedState};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("device {index} could not be opened: {reason}")]
    Open { index: usize, reason: String },

    #[error("unsupported {kind:?} mode")]
    UnsupportedMode { kind: StreamKind },

    #[error("{0} stream is not configured")]
    NotConfigured(&'static str),

    #[error("usb transfer failed: {0}")]
    Transfer(String),
}

/// Everything the core needs from a depth + color sensor driver.
///
/// All calls arrive from one thread at a time: the session guard serializes
/// controller calls against the capture thread's event pump.
pub trait Driver: Send {
    /// Bring up the driver context.
    fn init(&mut self) -> Result<(), DriverError>;

    /// Tear down the driver context. Must tolerate being called without a
    /// successful `init`.
    fn shutdown(&mut self);

    fn device_count(&mut self) -> Result<usize, DriverError>;

    fn open_device(&mut self, index: usize) -> Result<(), DriverError>;

    fn close_device(&mut self);

    fn supports_depth_mode(&self, mode: &DepthMode) -> bool;

    fn supports_color_mode(&self, mode: &ColorMode) -> bool;

    fn set_depth_mode(&mut self, mode: &DepthMode) -> Result<(), DriverError>;

    fn set_color_mode(&mut self, mode: &ColorMode) -> Result<(), DriverError>;

    fn start_stream(&mut self, kind: StreamKind) -> Result<(), DriverError>;

    fn stop_stream(&mut self, kind: StreamKind) -> Result<(), DriverError>;

    fn set_led(&mut self, led: LedState) -> Result<(), DriverError>;

    fn set_tilt_degrees(&mut self, angle: f64) -> Result<(), DriverError>;

    /// Wait up to `timeout` for pending USB events and hand every completed
    /// frame to `sink`, synchronously on the calling thread. The frame
    /// payload is only valid inside the call to `sink`.
    fn process_events(
        &mut self,
        timeout: Duration,
        sink: &mut dyn FnMut(RawFrame<'_>),
    ) -> Result<(), DriverError>;
}
