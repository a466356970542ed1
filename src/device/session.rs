//! Device lifecycle and actuator control

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{RawFrame, StreamKind};
use crate::device::driver::{Driver, DriverError};
use crate::device::mode::{ColorMode, DepthMode, LedState, StreamSet};
use crate::error::{Result, SensorError};

/// Mechanical limits of the tilt motor, in degrees
pub const MIN_TILT_DEGREES: f64 = -30.0;
pub const MAX_TILT_DEGREES: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
}

/// The single connection to the sensor hardware
pub struct DeviceSession<D: Driver> {
    driver: D,
    state: SessionState,
    device_index: usize,
    depth_mode: DepthMode,
    color_mode: ColorMode,
    streaming: StreamSet,
    led: Option<LedState>,
    tilt: Option<f64>,
}

impl<D: Driver> DeviceSession<D> {
    pub fn new(driver: D, device_index: usize) -> Self {
        Self {
            driver,
            state: SessionState::Closed,
            device_index,
            depth_mode: DepthMode::default(),
            color_mode: ColorMode::default(),
            streaming: StreamSet::NONE,
            led: None,
            tilt: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn streaming(&self) -> StreamSet {
        self.streaming
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// Last accepted LED state
    pub fn led(&self) -> Option<LedState> {
        self.led
    }

    /// Last accepted tilt angle
    pub fn tilt(&self) -> Option<f64> {
        self.tilt
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Open the configured device and apply the stream modes. No-op when
    /// already open. On failure the session is left `Closed`.
    #[instrument(skip(self), fields(index = self.device_index))]
    pub fn open(&mut self) -> Result<()> {
        if self.state == SessionState::Open {
            debug!("Device session already open");
            return Ok(());
        }

        self.state = SessionState::Opening;
        match self.try_open() {
            Ok(()) => {
                self.state = SessionState::Open;
                info!(
                    "Sensor {} open: depth {:?}, color {:?}",
                    self.device_index, self.depth_mode, self.color_mode
                );
                Ok(())
            }
            Err(err) => {
                self.driver.shutdown();
                self.state = SessionState::Closed;
                Err(err)
            }
        }
    }

    fn try_open(&mut self) -> Result<()> {
        self.driver
            .init()
            .map_err(|e| SensorError::DriverInit(e.to_string()))?;

        let count = self
            .driver
            .device_count()
            .map_err(|e| SensorError::DriverInit(e.to_string()))?;
        info!("Found {} sensor device(s)", count);
        if self.device_index >= count {
            return Err(SensorError::DeviceNotFound);
        }

        self.driver
            .open_device(self.device_index)
            .map_err(|e| SensorError::DriverInit(e.to_string()))?;

        if let Err(err) = self.apply_modes() {
            self.driver.close_device();
            return Err(err);
        }
        Ok(())
    }

    fn apply_modes(&mut self) -> Result<()> {
        self.driver
            .set_depth_mode(&self.depth_mode)
            .map_err(|e| SensorError::InvalidConfiguration(e.to_string()))?;
        self.driver
            .set_color_mode(&self.color_mode)
            .map_err(|e| SensorError::InvalidConfiguration(e.to_string()))?;
        Ok(())
    }

    /// Select stream modes. Allowed while closed or open but idle.
    pub fn configure_streams(&mut self, depth: DepthMode, color: ColorMode) -> Result<()> {
        if !self.streaming.is_empty() {
            return Err(SensorError::InvalidConfiguration(
                "stream modes cannot change while streaming".into(),
            ));
        }
        if !self.driver.supports_depth_mode(&depth) {
            return Err(SensorError::InvalidConfiguration(format!(
                "depth mode {depth:?} not supported"
            )));
        }
        if !self.driver.supports_color_mode(&color) {
            return Err(SensorError::InvalidConfiguration(format!(
                "color mode {color:?} not supported"
            )));
        }

        let previous = (self.depth_mode, self.color_mode);
        self.depth_mode = depth;
        self.color_mode = color;
        if self.is_open() {
            if let Err(err) = self.apply_modes() {
                (self.depth_mode, self.color_mode) = previous;
                return Err(err);
            }
        }
        debug!("Configured depth {:?}, color {:?}", depth, color);
        Ok(())
    }

    /// Start the requested streams. Already running streams are left alone.
    pub fn start_streaming(&mut self, kinds: StreamSet) -> Result<()> {
        self.ensure_open()?;
        for kind in kinds.kinds() {
            if self.streaming.contains(kind) {
                continue;
            }
            self.driver.start_stream(kind)?;
            self.set_streaming(kind, true);
            info!("{} stream started", kind.label());
        }
        Ok(())
    }

    /// Stop the requested streams. Idle streams are left alone.
    pub fn stop_streaming(&mut self, kinds: StreamSet) -> Result<()> {
        self.ensure_open()?;
        let mut first_error = None;
        for kind in kinds.kinds() {
            if !self.streaming.contains(kind) {
                continue;
            }
            // The flag is cleared even when the driver complains, a stream
            // we asked to stop is never delivered again
            if let Err(err) = self.driver.stop_stream(kind) {
                warn!("Failed to stop {} stream: {}", kind.label(), err);
                first_error.get_or_insert(err);
            }
            self.set_streaming(kind, false);
            info!("{} stream stopped", kind.label());
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn set_led(&mut self, led: LedState) -> Result<()> {
        self.ensure_open()?;
        self.driver.set_led(led)?;
        self.led = Some(led);
        debug!("LED set to {:?}", led);
        Ok(())
    }

    /// Tilt the sensor head. Angles outside the motor limits are rejected
    /// without touching the device.
    pub fn set_tilt(&mut self, angle: f64) -> Result<()> {
        if !angle.is_finite() || !(MIN_TILT_DEGREES..=MAX_TILT_DEGREES).contains(&angle) {
            return Err(SensorError::OutOfRange {
                what: "tilt angle",
                value: angle,
                min: MIN_TILT_DEGREES,
                max: MAX_TILT_DEGREES,
            });
        }
        self.ensure_open()?;
        self.driver.set_tilt_degrees(angle)?;
        self.tilt = Some(angle);
        debug!("Tilt set to {:.1} degrees", angle);
        Ok(())
    }

    /// Stop every stream and release the device. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(err) = self.stop_streaming(StreamSet::BOTH) {
            warn!("Error while stopping streams on close: {}", err);
        }
        self.driver.close_device();
        self.driver.shutdown();
        self.state = SessionState::Closed;
        self.led = None;
        self.tilt = None;
        info!("Sensor {} closed", self.device_index);
    }

    /// One bounded wait on the driver event pump.
    pub fn pump_events(
        &mut self,
        timeout: Duration,
        sink: &mut dyn FnMut(RawFrame<'_>),
    ) -> Result<(), DriverError> {
        if !self.is_open() {
            return Err(DriverError::Unavailable("session closed".into()));
        }
        self.driver.process_events(timeout, sink)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SensorError::NotInitialized)
        }
    }

    fn set_streaming(&mut self, kind: StreamKind, on: bool) {
        match kind {
            StreamKind::Depth => self.streaming.depth = on,
            StreamKind::Color => self.streaming.color = on,
        }
    }
}

impl<D: Driver> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Session guard shared by the controller and the capture thread.
///
/// The capture thread relocks right after every pump, so controller calls
/// register themselves first and the pump backs off until they are served.
pub struct SharedSession<D: Driver> {
    session: Mutex<DeviceSession<D>>,
    waiting_controllers: AtomicUsize,
}

impl<D: Driver> SharedSession<D> {
    pub fn new(session: DeviceSession<D>) -> Self {
        Self {
            session: Mutex::new(session),
            waiting_controllers: AtomicUsize::new(0),
        }
    }

    /// Lock for a lifecycle or actuator call.
    pub fn lock(&self) -> MutexGuard<'_, DeviceSession<D>> {
        self.waiting_controllers.fetch_add(1, Ordering::AcqRel);
        let guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        self.waiting_controllers.fetch_sub(1, Ordering::AcqRel);
        guard
    }

    /// Lock for the next event pump, yielding to waiting controller calls.
    pub(crate) fn lock_for_pump(&self) -> MutexGuard<'_, DeviceSession<D>> {
        while self.waiting_controllers.load(Ordering::Acquire) > 0 {
            thread::yield_now();
        }
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
