//! Dedicated capture thread: pumps driver events, fills the frame buffers and
//! dispatches to the registered algorithm

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use tracing::{debug, error, info, warn};

use crate::algorithm::AlgorithmSlot;
use crate::capture::buffer::FrameBuffers;
use crate::capture::dispatch::Dispatcher;
use crate::capture::frame::{Frame, StreamKind};
use crate::capture::stats::CaptureStats;
use crate::device::{Driver, SharedSession};
use crate::error::{Result, SensorError};
use crate::{utils, CaptureConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Stopping,
}

/// Shared state the capture thread works against
pub struct CaptureContext<D: Driver> {
    pub session: Arc<SharedSession<D>>,
    pub buffers: Arc<FrameBuffers>,
    pub algorithm: Arc<AlgorithmSlot>,
    pub stats: Arc<CaptureStats>,
}

pub struct CaptureThread {
    config: CaptureConfig,
    state: AtomicCell<CaptureState>,
    /// Liveness flag polled by the thread
    alive: Arc<AtomicBool>,
    /// Per-kind frame sequence, kept across restarts
    sequences: Arc<[AtomicU64; 2]>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            state: AtomicCell::new(CaptureState::Idle),
            alive: Arc::new(AtomicBool::new(false)),
            sequences: Arc::new([AtomicU64::new(0), AtomicU64::new(0)]),
            handle: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    /// Spawn the capture thread.
    pub fn start<D: Driver + 'static>(&mut self, ctx: CaptureContext<D>) -> Result<()> {
        if self.state() != CaptureState::Idle {
            return Err(SensorError::AlreadyRunning);
        }

        self.alive.store(true, Ordering::Release);
        let alive = self.alive.clone();
        let sequences = self.sequences.clone();
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("depthlink-capture".into())
            .spawn(move || capture_loop(ctx, alive, sequences, config));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state.store(CaptureState::Running);
                info!("Capture thread started");
                Ok(())
            }
            Err(err) => {
                self.alive.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Clear the liveness flag and wait for the thread to exit. Once this
    /// returns, no buffer write or plugin hook runs until the next `start`.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Err(SensorError::NotRunning);
        };

        self.state.store(CaptureState::Stopping);
        self.alive.store(false, Ordering::Release);
        if handle.join().is_err() {
            error!("Capture thread panicked");
        }
        self.state.store(CaptureState::Idle);
        info!("Capture thread stopped");
        Ok(())
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

fn capture_loop<D: Driver>(
    ctx: CaptureContext<D>,
    alive: Arc<AtomicBool>,
    sequences: Arc<[AtomicU64; 2]>,
    config: CaptureConfig,
) {
    utils::pin_current_thread(config.cpu_core);

    let timeout = Duration::from_millis(config.pump_timeout_ms);
    let backoff = Duration::from_millis(config.error_backoff_ms);
    let mut dispatcher = Dispatcher::new();
    let mut arrived: Vec<Frame> = Vec::with_capacity(2);

    while alive.load(Ordering::Acquire) {
        let (pumped, streaming) = {
            let mut session = ctx.session.lock_for_pump();
            let stats = &ctx.stats;
            let pumped = session.pump_events(timeout, &mut |raw| {
                let sequence = sequences[slot_index(raw.kind)].fetch_add(1, Ordering::Relaxed) + 1;
                // Driver memory is only valid inside this callback
                match Frame::from_raw(&raw, sequence) {
                    Ok(frame) => arrived.push(frame),
                    Err(err) => {
                        warn!("Dropping malformed frame: {}", err);
                        stats.frame_dropped(raw.kind);
                    }
                }
            });
            (pumped, session.streaming())
        };

        if !alive.load(Ordering::Acquire) {
            break;
        }

        for frame in arrived.drain(..) {
            let kind = frame.kind();
            if let Err(err) = ctx.buffers.write(frame.clone()) {
                warn!("Dropping {} frame: {}", kind.label(), err);
                ctx.stats.frame_dropped(kind);
                continue;
            }
            ctx.stats.frame_captured(kind);
            dispatcher.dispatch(
                frame,
                streaming.contains(kind.partner()),
                &ctx.algorithm,
                &ctx.stats,
            );
        }

        if let Err(err) = pumped {
            ctx.stats.pump_failed();
            warn!("Event pump failed: {}", err);
            thread::sleep(backoff);
        }
    }

    debug!("Capture loop exited");
}

fn slot_index(kind: StreamKind) -> usize {
    match kind {
        StreamKind::Depth => 0,
        StreamKind::Color => 1,
    }
}
