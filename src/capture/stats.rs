//! Capture counters shared between the capture thread and the controller

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use metrics::counter;

use crate::capture::frame::StreamKind;

/// Counters written by the capture thread, read by anyone
#[derive(Default)]
pub struct CaptureStats {
    inner: CachePadded<Counters>,
}

#[derive(Default)]
struct Counters {
    depth_frames: AtomicU64,
    color_frames: AtomicU64,
    synchronized_dispatches: AtomicU64,
    single_dispatches: AtomicU64,
    plugin_failures: AtomicU64,
    dropped_frames: AtomicU64,
    pump_errors: AtomicU64,
}

/// Point-in-time copy of [`CaptureStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub depth_frames: u64,
    pub color_frames: u64,
    pub synchronized_dispatches: u64,
    pub single_dispatches: u64,
    pub plugin_failures: u64,
    pub dropped_frames: u64,
    pub pump_errors: u64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_captured(&self, kind: StreamKind) {
        match kind {
            StreamKind::Depth => self.inner.depth_frames.fetch_add(1, Ordering::Relaxed),
            StreamKind::Color => self.inner.color_frames.fetch_add(1, Ordering::Relaxed),
        };
        counter!("depthlink_frames_captured_total", "stream" => kind.label()).increment(1);
    }

    pub(crate) fn frame_dropped(&self, kind: StreamKind) {
        self.inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
        counter!("depthlink_frames_dropped_total", "stream" => kind.label()).increment(1);
    }

    pub(crate) fn single_dispatched(&self, kind: StreamKind) {
        self.inner.single_dispatches.fetch_add(1, Ordering::Relaxed);
        counter!("depthlink_dispatches_total", "path" => kind.label()).increment(1);
    }

    pub(crate) fn synchronized_dispatched(&self) {
        self.inner
            .synchronized_dispatches
            .fetch_add(1, Ordering::Relaxed);
        counter!("depthlink_dispatches_total", "path" => "synchronized").increment(1);
    }

    pub(crate) fn plugin_failed(&self, hook: &'static str) {
        self.inner.plugin_failures.fetch_add(1, Ordering::Relaxed);
        counter!("depthlink_plugin_failures_total", "hook" => hook).increment(1);
    }

    pub(crate) fn pump_failed(&self) {
        self.inner.pump_errors.fetch_add(1, Ordering::Relaxed);
        counter!("depthlink_pump_errors_total").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            depth_frames: self.inner.depth_frames.load(Ordering::Relaxed),
            color_frames: self.inner.color_frames.load(Ordering::Relaxed),
            synchronized_dispatches: self.inner.synchronized_dispatches.load(Ordering::Relaxed),
            single_dispatches: self.inner.single_dispatches.load(Ordering::Relaxed),
            plugin_failures: self.inner.plugin_failures.load(Ordering::Relaxed),
            dropped_frames: self.inner.dropped_frames.load(Ordering::Relaxed),
            pump_errors: self.inner.pump_errors.load(Ordering::Relaxed),
        }
    }
}
