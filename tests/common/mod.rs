#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre;
use depthlink::device::{SimulatedConfig, SimulatedDriver};
use depthlink::{AlgorithmPlugin, Config, DepthSensor};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(5);

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.capture.pump_timeout_ms = 2;
    config.capture.error_backoff_ms = 1;
    config
}

pub fn simulated(config: SimulatedConfig) -> SimulatedDriver {
    SimulatedDriver::new(SimulatedConfig {
        frame_interval: FRAME_INTERVAL,
        ..config
    })
}

pub fn sensor(config: Config) -> DepthSensor<SimulatedDriver> {
    DepthSensor::with_config(simulated(SimulatedConfig::default()), config)
}

pub fn initialized_sensor() -> DepthSensor<SimulatedDriver> {
    let mut sensor = sensor(fast_config());
    sensor.initialize().unwrap();
    sensor
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Plugin that counts every hook and can be told to misbehave
#[derive(Default)]
pub struct Probe {
    pub synchronized: bool,
    /// 1-based depth call that returns an error
    pub fail_depth_call: Option<u64>,
    /// 1-based depth call that panics
    pub panic_depth_call: Option<u64>,
    pub depth_calls: u64,
    pub rgb_calls: u64,
    pub sync_calls: u64,
    pub initialized: u32,
    pub shutdowns: u32,
    pub last_depth_dims: Option<(u32, u32)>,
    pub last_rgb_dims: Option<(u32, u32)>,
    /// Hooks observing this set count as late calls
    pub sentinel: Option<Arc<AtomicBool>>,
    pub late_calls: u64,
}

impl Probe {
    pub fn shared(self) -> Arc<Mutex<Probe>> {
        Arc::new(Mutex::new(self))
    }

    fn observe(&mut self) {
        if self
            .sentinel
            .as_ref()
            .is_some_and(|sentinel| sentinel.load(Ordering::SeqCst))
        {
            self.late_calls += 1;
        }
    }
}

impl AlgorithmPlugin for Probe {
    fn on_initialize(&mut self) -> eyre::Result<()> {
        self.initialized += 1;
        Ok(())
    }

    fn on_shutdown(&mut self) -> eyre::Result<()> {
        self.shutdowns += 1;
        Ok(())
    }

    fn process_depth_data(&mut self, depth: &[u16], width: u32, height: u32) -> eyre::Result<()> {
        self.observe();
        self.depth_calls += 1;
        assert_eq!(depth.len(), (width * height) as usize);
        self.last_depth_dims = Some((width, height));
        if self.panic_depth_call == Some(self.depth_calls) {
            panic!("probe panicked on depth call {}", self.depth_calls);
        }
        if self.fail_depth_call == Some(self.depth_calls) {
            eyre::bail!("probe failed on depth call {}", self.depth_calls);
        }
        Ok(())
    }

    fn process_rgb_data(&mut self, rgb: &[u8], width: u32, height: u32) -> eyre::Result<()> {
        self.observe();
        self.rgb_calls += 1;
        assert_eq!(rgb.len(), (width * height * 3) as usize);
        self.last_rgb_dims = Some((width, height));
        Ok(())
    }

    fn process_synchronized_data(
        &mut self,
        depth: &[u16],
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> eyre::Result<()> {
        self.observe();
        self.sync_calls += 1;
        assert_eq!(depth.len() * 3, rgb.len());
        assert_eq!(depth.len(), (width * height) as usize);
        Ok(())
    }

    fn synchronized(&self) -> bool {
        self.synchronized
    }

    fn name(&self) -> &str {
        "Probe"
    }
}
