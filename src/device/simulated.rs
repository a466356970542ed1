//! Synthetic sensor for demos and tests
//!
//! Produces a depth ramp with a no-return band on the left edge and a color
//! gradient, one depth and one color frame per cycle for every active stream.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::capture::frame::{RawFrame, StreamKind};
use crate::device::driver::{Driver, DriverError};
use crate::device::mode::{ColorMode, DepthMode, LedState, Resolution, StreamSet};

/// Columns on the left edge that never report depth
const NO_RETURN_COLUMNS: u32 = 8;

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Number of devices reported by enumeration
    pub devices: usize,
    /// Fail the driver context bring-up
    pub fail_init: bool,
    /// Fail device enumeration after a successful bring-up
    pub fail_enumeration: bool,
    /// Refuse to start the color stream
    pub fail_color_start: bool,
    /// Time between frame cycles
    pub frame_interval: Duration,
    /// Number of initial event pumps that fail with a transfer error
    pub pump_failures: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            devices: 1,
            fail_init: false,
            fail_enumeration: false,
            fail_color_start: false,
            frame_interval: Duration::from_millis(33),
            pump_failures: 0,
        }
    }
}

pub struct SimulatedDriver {
    config: SimulatedConfig,
    initialized: bool,
    device_open: bool,
    depth_mode: Option<DepthMode>,
    color_mode: Option<ColorMode>,
    streaming: StreamSet,
    led: Option<LedState>,
    tilt: Option<f64>,
    cycle: u32,
    timestamp: u32,
    next_cycle: Option<Instant>,
    pump_failures_left: u32,
    depth_memory: Vec<u16>,
    color_memory: Vec<u8>,
}

impl SimulatedDriver {
    pub fn new(config: SimulatedConfig) -> Self {
        let pump_failures_left = config.pump_failures;
        Self {
            config,
            initialized: false,
            device_open: false,
            depth_mode: None,
            color_mode: None,
            streaming: StreamSet::NONE,
            led: None,
            tilt: None,
            cycle: 0,
            timestamp: 0,
            next_cycle: None,
            pump_failures_left,
            depth_memory: Vec::new(),
            color_memory: Vec::new(),
        }
    }

    pub fn is_device_open(&self) -> bool {
        self.device_open
    }

    pub fn led(&self) -> Option<LedState> {
        self.led
    }

    pub fn tilt_degrees(&self) -> Option<f64> {
        self.tilt
    }

    pub fn cycles(&self) -> u32 {
        self.cycle
    }

    fn ensure_device(&self) -> Result<(), DriverError> {
        if self.device_open {
            Ok(())
        } else {
            Err(DriverError::Unavailable("no device open".into()))
        }
    }

    fn emit_cycle(&mut self, sink: &mut dyn FnMut(RawFrame<'_>)) {
        self.cycle = self.cycle.wrapping_add(1);
        self.timestamp = self
            .timestamp
            .wrapping_add(self.config.frame_interval.as_micros() as u32);

        if self.streaming.depth {
            if let Some(mode) = self.depth_mode {
                let (width, height) = mode.resolution.dimensions();
                fill_depth(&mut self.depth_memory, width, height, self.cycle);
                sink(RawFrame {
                    kind: StreamKind::Depth,
                    data: bytemuck::cast_slice(&self.depth_memory),
                    width,
                    height,
                    timestamp: self.timestamp,
                });
            }
        }

        if self.streaming.color {
            if let Some(mode) = self.color_mode {
                let (width, height) = mode.resolution.dimensions();
                fill_color(&mut self.color_memory, width, height, self.cycle);
                sink(RawFrame {
                    kind: StreamKind::Color,
                    data: &self.color_memory,
                    width,
                    height,
                    timestamp: self.timestamp,
                });
            }
        }
        trace!("Simulated cycle {} emitted", self.cycle);
    }
}

impl Driver for SimulatedDriver {
    fn init(&mut self) -> Result<(), DriverError> {
        if self.config.fail_init {
            return Err(DriverError::Unavailable("simulated init failure".into()));
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
    }

    fn device_count(&mut self) -> Result<usize, DriverError> {
        if !self.initialized {
            return Err(DriverError::Unavailable("driver not initialized".into()));
        }
        if self.config.fail_enumeration {
            return Err(DriverError::Transfer("simulated enumeration failure".into()));
        }
        Ok(self.config.devices)
    }

    fn open_device(&mut self, index: usize) -> Result<(), DriverError> {
        if index >= self.config.devices {
            return Err(DriverError::Open {
                index,
                reason: "no such device".into(),
            });
        }
        self.device_open = true;
        debug!("Simulated device {} opened", index);
        Ok(())
    }

    fn close_device(&mut self) {
        self.device_open = false;
        self.streaming = StreamSet::NONE;
        self.next_cycle = None;
    }

    fn supports_depth_mode(&self, mode: &DepthMode) -> bool {
        mode.resolution == Resolution::Medium
    }

    fn supports_color_mode(&self, mode: &ColorMode) -> bool {
        matches!(mode.resolution, Resolution::Medium | Resolution::High)
    }

    fn set_depth_mode(&mut self, mode: &DepthMode) -> Result<(), DriverError> {
        if !self.supports_depth_mode(mode) {
            return Err(DriverError::UnsupportedMode {
                kind: StreamKind::Depth,
            });
        }
        self.depth_mode = Some(*mode);
        Ok(())
    }

    fn set_color_mode(&mut self, mode: &ColorMode) -> Result<(), DriverError> {
        if !self.supports_color_mode(mode) {
            return Err(DriverError::UnsupportedMode {
                kind: StreamKind::Color,
            });
        }
        self.color_mode = Some(*mode);
        Ok(())
    }

    fn start_stream(&mut self, kind: StreamKind) -> Result<(), DriverError> {
        self.ensure_device()?;
        match kind {
            StreamKind::Depth if self.depth_mode.is_none() => {
                return Err(DriverError::NotConfigured("depth"))
            }
            StreamKind::Color if self.color_mode.is_none() => {
                return Err(DriverError::NotConfigured("color"))
            }
            StreamKind::Color if self.config.fail_color_start => {
                return Err(DriverError::Transfer("simulated color start failure".into()))
            }
            StreamKind::Depth => self.streaming.depth = true,
            StreamKind::Color => self.streaming.color = true,
        }
        Ok(())
    }

    fn stop_stream(&mut self, kind: StreamKind) -> Result<(), DriverError> {
        self.ensure_device()?;
        match kind {
            StreamKind::Depth => self.streaming.depth = false,
            StreamKind::Color => self.streaming.color = false,
        }
        Ok(())
    }

    fn set_led(&mut self, led: LedState) -> Result<(), DriverError> {
        self.ensure_device()?;
        self.led = Some(led);
        Ok(())
    }

    fn set_tilt_degrees(&mut self, angle: f64) -> Result<(), DriverError> {
        self.ensure_device()?;
        self.tilt = Some(angle);
        Ok(())
    }

    fn process_events(
        &mut self,
        timeout: Duration,
        sink: &mut dyn FnMut(RawFrame<'_>),
    ) -> Result<(), DriverError> {
        self.ensure_device()?;
        if self.pump_failures_left > 0 {
            self.pump_failures_left -= 1;
            thread::sleep(timeout);
            return Err(DriverError::Transfer("simulated isochronous error".into()));
        }
        if self.streaming.is_empty() {
            thread::sleep(timeout);
            return Ok(());
        }

        let now = Instant::now();
        let due = *self.next_cycle.get_or_insert(now);
        if due > now {
            let wait = due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(());
            }
            thread::sleep(wait);
        }

        self.emit_cycle(sink);

        // A slow consumer skips cycles instead of receiving a burst
        let next = due + self.config.frame_interval;
        let now = Instant::now();
        self.next_cycle = Some(if next < now { now } else { next });
        Ok(())
    }
}

fn fill_depth(memory: &mut Vec<u16>, width: u32, height: u32, cycle: u32) {
    memory.resize((width * height) as usize, 0);
    for y in 0..height {
        for x in 0..width {
            let sample = if x < NO_RETURN_COLUMNS {
                0
            } else {
                800 + ((x + y).wrapping_add(cycle) % 512) as u16 * 4
            };
            memory[(y * width + x) as usize] = sample;
        }
    }
}

fn fill_color(memory: &mut Vec<u8>, width: u32, height: u32, cycle: u32) {
    memory.resize((width * height * 3) as usize, 0);
    for y in 0..height {
        for x in 0..width {
            let offset = ((y * width + x) * 3) as usize;
            memory[offset] = (x * 255 / width) as u8;
            memory[offset + 1] = (y * 255 / height) as u8;
            memory[offset + 2] = cycle as u8;
        }
    }
}
