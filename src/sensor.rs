//! Controller-facing sensor handle
//!
//! None of these methods may be called from inside an algorithm hook.

use std::sync::{Arc, Mutex};

use tracing::{info, instrument, warn};

use crate::algorithm::{AlgorithmPlugin, AlgorithmSlot, SharedAlgorithm};
use crate::capture::{
    CaptureContext, CaptureState, CaptureStats, CaptureThread, Frame, FrameBuffers, StatsSnapshot,
};
use crate::device::{DeviceSession, Driver, LedState, SharedSession, StreamSet};
use crate::error::{Result, SensorError};
use crate::{Config, CONFIG};

pub struct DepthSensor<D: Driver + 'static> {
    config: Config,
    session: Arc<SharedSession<D>>,
    buffers: Arc<FrameBuffers>,
    algorithm: Arc<AlgorithmSlot>,
    stats: Arc<CaptureStats>,
    capture: CaptureThread,
}

impl<D: Driver + 'static> DepthSensor<D> {
    /// Sensor using the process-wide [`CONFIG`]
    pub fn new(driver: D) -> Self {
        let config = Config::clone(&CONFIG.load());
        Self::with_config(driver, config)
    }

    pub fn with_config(driver: D, config: Config) -> Self {
        let session = DeviceSession::new(driver, config.device.index);
        let buffers = FrameBuffers::new(
            config.device.depth.frame_bytes(),
            config.device.color.frame_bytes(),
        );
        Self {
            capture: CaptureThread::new(config.capture.clone()),
            session: Arc::new(SharedSession::new(session)),
            buffers: Arc::new(buffers),
            algorithm: Arc::new(AlgorithmSlot::new()),
            stats: Arc::new(CaptureStats::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the device with the configured modes, then apply the configured
    /// LED and tilt. Leaves the device closed on failure.
    #[instrument(skip(self))]
    pub fn initialize(&mut self) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_open() {
            return Ok(());
        }

        let device = &self.config.device;
        session.configure_streams(device.depth, device.color)?;
        session.open()?;

        if let Some(angle) = device.tilt_degrees {
            if let Err(err) = session.set_tilt(angle) {
                session.close();
                return Err(err);
            }
        }
        if let Err(err) = session.set_led(device.led) {
            warn!("Failed to set LED: {}", err);
        }

        self.buffers.depth.reserve(device.depth.frame_bytes());
        self.buffers.color.reserve(device.color.frame_bytes());
        info!("Sensor initialized");
        Ok(())
    }

    /// Start the configured streams and the capture thread. The registered
    /// algorithm is initialized first.
    #[instrument(skip(self))]
    pub fn start_capture(&mut self) -> Result<()> {
        if self.capture.state() != CaptureState::Idle {
            return Err(SensorError::AlreadyRunning);
        }

        {
            let mut session = self.session.lock();
            if !session.is_open() {
                return Err(SensorError::NotInitialized);
            }
            self.algorithm.initialize()?;
            if let Err(err) = session.start_streaming(self.config.capture.streams()) {
                if let Err(cleanup) = session.stop_streaming(StreamSet::BOTH) {
                    warn!("Failed to stop streams after start failure: {}", cleanup);
                }
                return Err(err);
            }
        }

        let ctx = CaptureContext {
            session: self.session.clone(),
            buffers: self.buffers.clone(),
            algorithm: self.algorithm.clone(),
            stats: self.stats.clone(),
        };
        if let Err(err) = self.capture.start(ctx) {
            if let Err(cleanup) = self.session.lock().stop_streaming(StreamSet::BOTH) {
                warn!("Failed to stop streams after spawn failure: {}", cleanup);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Stop the capture thread, then the streams. Returns once no further
    /// frame can reach the buffers or the algorithm.
    #[instrument(skip(self))]
    pub fn stop_capture(&mut self) -> Result<()> {
        self.capture.stop()?;
        let mut session = self.session.lock();
        if session.is_open() {
            session.stop_streaming(StreamSet::BOTH)?;
        }
        Ok(())
    }

    /// Stop capture, shut the algorithm down and close the device. Safe to
    /// call repeatedly.
    pub fn shutdown(&mut self) {
        if self.capture.state() != CaptureState::Idle {
            if let Err(err) = self.stop_capture() {
                warn!("Error while stopping capture: {}", err);
            }
        }
        self.algorithm.clear();
        self.session.lock().close();
        self.buffers.clear();
    }

    /// Register the processing algorithm. The sensor holds it weakly; it is
    /// never invoked once the caller drops every `Arc` to it.
    ///
    /// Any previous algorithm is shut down. When capture is running the new
    /// one is initialized immediately.
    pub fn set_algorithm<P: AlgorithmPlugin + 'static>(&self, plugin: &Arc<Mutex<P>>) -> Result<()> {
        let shared: SharedAlgorithm = plugin.clone();
        self.algorithm.register(&shared, self.capture.is_running())
    }

    /// Unregister the algorithm. Waits for an in-flight hook to return.
    pub fn clear_algorithm(&self) {
        self.algorithm.clear();
    }

    pub fn algorithm_name(&self) -> Option<String> {
        self.algorithm.name()
    }

    /// Latest depth frame, `None` until one has been captured
    pub fn depth_data(&self) -> Option<Frame> {
        self.buffers.depth.read_snapshot()
    }

    /// Latest color frame, `None` until one has been captured
    pub fn rgb_data(&self) -> Option<Frame> {
        self.buffers.color.read_snapshot()
    }

    /// Negotiated depth resolution, once initialized
    pub fn depth_dimensions(&self) -> Option<(u32, u32)> {
        let session = self.session.lock();
        session
            .is_open()
            .then(|| session.depth_mode().resolution.dimensions())
    }

    /// Negotiated color resolution, once initialized
    pub fn rgb_dimensions(&self) -> Option<(u32, u32)> {
        let session = self.session.lock();
        session
            .is_open()
            .then(|| session.color_mode().resolution.dimensions())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.lock().is_open()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn set_led(&self, led: LedState) -> Result<()> {
        self.session.lock().set_led(led)
    }

    /// Set the LED from a raw firmware code
    pub fn set_led_code(&self, code: u8) -> Result<()> {
        self.set_led(LedState::try_from(code)?)
    }

    /// Tilt in degrees, within [-30, 30]
    pub fn set_tilt_angle(&self, angle: f64) -> Result<()> {
        self.session.lock().set_tilt(angle)
    }

    /// Last accepted tilt angle
    pub fn tilt_angle(&self) -> Option<f64> {
        self.session.lock().tilt()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<D: Driver + 'static> Drop for DepthSensor<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
