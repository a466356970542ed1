//! depthlink demo: simulated sensor feeding a scene statistics algorithm
//!
//! Usage: `depthlink [config.toml] [seconds]`

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::{eyre, Result};
use flume::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use depthlink::device::{SimulatedConfig, SimulatedDriver};
use depthlink::{utils, AlgorithmPlugin, Config, DepthSensor, CONFIG};

/// Frames between two published summaries
const SUMMARY_EVERY: u64 = 30;

#[derive(Debug, Clone, Copy)]
struct SceneSummary {
    frames: u64,
    nearest_mm: Option<u16>,
    no_return_ratio: f64,
    mean_brightness: f64,
}

/// Nearest obstacle and scene brightness, published over a channel so the
/// capture thread never waits on the consumer
struct SceneStatistics {
    tx: Sender<SceneSummary>,
    frames: u64,
    last: SceneSummary,
}

impl SceneStatistics {
    fn new(tx: Sender<SceneSummary>) -> Self {
        Self {
            tx,
            frames: 0,
            last: SceneSummary {
                frames: 0,
                nearest_mm: None,
                no_return_ratio: 0.0,
                mean_brightness: 0.0,
            },
        }
    }

    fn publish(&mut self) {
        self.frames += 1;
        self.last.frames = self.frames;
        if self.frames % SUMMARY_EVERY != 0 {
            return;
        }
        match self.tx.try_send(self.last) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => debug!("Summary consumer gone"),
        }
    }
}

impl AlgorithmPlugin for SceneStatistics {
    fn on_initialize(&mut self) -> eyre::Result<()> {
        info!("Scene statistics ready");
        Ok(())
    }

    fn on_shutdown(&mut self) -> eyre::Result<()> {
        info!("Scene statistics processed {} frames", self.frames);
        Ok(())
    }

    fn process_depth_data(&mut self, depth: &[u16], _width: u32, _height: u32) -> eyre::Result<()> {
        if depth.is_empty() {
            eyre::bail!("empty depth frame");
        }
        let no_return = depth.iter().filter(|mm| **mm == 0).count();
        self.last.nearest_mm = depth.iter().copied().filter(|mm| *mm > 0).min();
        self.last.no_return_ratio = no_return as f64 / depth.len() as f64;
        Ok(())
    }

    fn process_rgb_data(&mut self, rgb: &[u8], _width: u32, _height: u32) -> eyre::Result<()> {
        if rgb.is_empty() {
            eyre::bail!("empty color frame");
        }
        let sum: u64 = rgb.iter().map(|b| u64::from(*b)).sum();
        self.last.mean_brightness = sum as f64 / rgb.len() as f64;
        Ok(())
    }

    fn process_synchronized_data(
        &mut self,
        depth: &[u16],
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> eyre::Result<()> {
        self.process_depth_data(depth, width, height)?;
        self.process_rgb_data(rgb, width, height)?;
        self.publish();
        Ok(())
    }

    fn synchronized(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "SceneStatistics"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }
}

async fn report(rx: Receiver<SceneSummary>) {
    while let Ok(summary) = rx.recv_async().await {
        info!(
            "frame {}: nearest {:?} mm, {:.1}% no return, brightness {:.1}",
            summary.frames,
            summary.nearest_mm,
            summary.no_return_ratio * 100.0,
            summary.mean_brightness
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    utils::init_tracing("depthlink=debug");

    info!("depthlink launching...");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let run_for = args
        .next()
        .map(|secs| secs.parse::<u64>().map(Duration::from_secs))
        .transpose()?;

    // Load configuration
    let config = Config::load(config_path.as_deref())?;
    CONFIG.store(Arc::new(config));

    let mut sensor = DepthSensor::new(SimulatedDriver::new(SimulatedConfig::default()));
    sensor.initialize()?;
    info!(
        "Depth {:?}, color {:?}",
        sensor.depth_dimensions(),
        sensor.rgb_dimensions()
    );

    let (tx, rx) = flume::bounded(8);
    let algorithm = Arc::new(Mutex::new(SceneStatistics::new(tx)));
    sensor.set_algorithm(&algorithm)?;
    sensor.start_capture()?;

    let reporter = tokio::spawn(report(rx));
    match run_for {
        Some(duration) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                _ = tokio::time::sleep(duration) => info!("Run time elapsed"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    sensor.stop_capture()?;
    let stats = sensor.stats();
    if stats.plugin_failures > 0 {
        warn!("{} algorithm hook failures", stats.plugin_failures);
    }
    info!("Capture stats: {:?}", stats);

    sensor.shutdown();
    // Shutdown released the algorithm, dropping it closes the summary channel
    drop(algorithm);
    reporter.await?;

    info!("depthlink shutting down");
    Ok(())
}
