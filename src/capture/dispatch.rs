//! Routing of captured frames to the plugin hooks
//!
//! Plugins that opt into synchronized processing get depth and color frames
//! paired per cycle. A cycle ends when a second frame of the same kind shows
//! up before its partner; the unpaired frame is then delivered on its own.
//! Pairs with different dimensions are never merged.

use crate::algorithm::{invoke_hook, AlgorithmPlugin, AlgorithmSlot};
use crate::capture::frame::{Frame, StreamKind};
use crate::capture::stats::CaptureStats;

#[derive(Default)]
pub(crate) struct Dispatcher {
    /// Frame of the current cycle still waiting for its partner
    held: Option<Frame>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Deliver `frame`. `partner_streaming` tells whether a frame of the
    /// other kind can still arrive.
    pub(crate) fn dispatch(
        &mut self,
        frame: Frame,
        partner_streaming: bool,
        slot: &AlgorithmSlot,
        stats: &CaptureStats,
    ) {
        let delivered = slot.with_plugin(|plugin, name| {
            self.route(frame, partner_streaming, plugin, name, stats)
        });
        if delivered.is_none() {
            self.held = None;
        }
    }

    fn route(
        &mut self,
        frame: Frame,
        partner_streaming: bool,
        plugin: &mut dyn AlgorithmPlugin,
        name: &str,
        stats: &CaptureStats,
    ) {
        if !plugin.synchronized() || !partner_streaming {
            if let Some(held) = self.held.take() {
                deliver_single(plugin, name, &held, stats);
            }
            deliver_single(plugin, name, &frame, stats);
            return;
        }

        match self.held.take() {
            None => self.held = Some(frame),
            Some(held) if held.kind() == frame.kind() => {
                deliver_single(plugin, name, &held, stats);
                self.held = Some(frame);
            }
            Some(held) if !held.same_dimensions(&frame) => {
                deliver_single(plugin, name, &held, stats);
                deliver_single(plugin, name, &frame, stats);
            }
            Some(held) => {
                let (depth, color) = match held.kind() {
                    StreamKind::Depth => (held, frame),
                    StreamKind::Color => (frame, held),
                };
                deliver_synchronized(plugin, name, &depth, &color, stats);
            }
        }
    }
}

fn deliver_single(
    plugin: &mut dyn AlgorithmPlugin,
    name: &str,
    frame: &Frame,
    stats: &CaptureStats,
) {
    let (width, height) = frame.dimensions();
    let (hook, result) = match frame.kind() {
        StreamKind::Depth => {
            let samples = frame.depth_samples().unwrap_or_default();
            let hook = "process_depth_data";
            (
                hook,
                invoke_hook(hook, name, || {
                    plugin.process_depth_data(&samples, width, height)
                }),
            )
        }
        StreamKind::Color => {
            let hook = "process_rgb_data";
            (
                hook,
                invoke_hook(hook, name, || {
                    plugin.process_rgb_data(&frame.data, width, height)
                }),
            )
        }
    };

    stats.single_dispatched(frame.kind());
    if result.is_err() {
        stats.plugin_failed(hook);
    }
}

fn deliver_synchronized(
    plugin: &mut dyn AlgorithmPlugin,
    name: &str,
    depth: &Frame,
    color: &Frame,
    stats: &CaptureStats,
) {
    let hook = "process_synchronized_data";
    let (width, height) = depth.dimensions();
    let samples = depth.depth_samples().unwrap_or_default();

    let result = invoke_hook(hook, name, || {
        plugin.process_synchronized_data(&samples, &color.data, width, height)
    });

    stats.synchronized_dispatched();
    if result.is_err() {
        stats.plugin_failed(hook);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use color_eyre::eyre;

    use super::*;
    use crate::algorithm::SharedAlgorithm;

    #[derive(Default)]
    struct Recorder {
        synchronized: bool,
        events: Vec<String>,
    }

    impl AlgorithmPlugin for Recorder {
        fn process_depth_data(&mut self, depth: &[u16], width: u32, height: u32) -> eyre::Result<()> {
            self.events.push(format!("depth:{}:{}x{}", depth[0], width, height));
            Ok(())
        }

        fn process_rgb_data(&mut self, rgb: &[u8], width: u32, height: u32) -> eyre::Result<()> {
            self.events.push(format!("rgb:{}:{}x{}", rgb[0], width, height));
            Ok(())
        }

        fn synchronized(&self) -> bool {
            self.synchronized
        }
    }

    /// Overrides the paired hook
    #[derive(Default)]
    struct PairRecorder {
        events: Vec<String>,
    }

    impl AlgorithmPlugin for PairRecorder {
        fn process_depth_data(&mut self, depth: &[u16], width: u32, height: u32) -> eyre::Result<()> {
            self.events.push(format!("depth:{}:{}x{}", depth[0], width, height));
            Ok(())
        }

        fn process_rgb_data(&mut self, rgb: &[u8], width: u32, height: u32) -> eyre::Result<()> {
            self.events.push(format!("rgb:{}:{}x{}", rgb[0], width, height));
            Ok(())
        }

        fn process_synchronized_data(
            &mut self,
            depth: &[u16],
            rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> eyre::Result<()> {
            self.events.push(format!("sync:{}/{}", depth[0], rgb[0]));
            Ok(())
        }

        fn synchronized(&self) -> bool {
            true
        }
    }

    fn frame(kind: StreamKind, width: u32, height: u32, tag: u8) -> Frame {
        let pixels = (width * height) as usize;
        let data = match kind {
            StreamKind::Depth => (0..pixels)
                .flat_map(|_| u16::from(tag).to_ne_bytes())
                .collect(),
            StreamKind::Color => vec![tag; pixels * 3],
        };
        Frame::new(kind, width, height, Bytes::from(data), u64::from(tag), 0).unwrap()
    }

    fn setup<P: AlgorithmPlugin + 'static>(plugin: P) -> (Arc<Mutex<P>>, AlgorithmSlot) {
        let plugin = Arc::new(Mutex::new(plugin));
        let shared: SharedAlgorithm = plugin.clone();
        let slot = AlgorithmSlot::new();
        slot.register(&shared, false).unwrap();
        (plugin, slot)
    }

    #[test]
    fn unsynchronized_plugin_gets_every_frame_individually() {
        let (plugin, slot) = setup(Recorder::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 1), true, &slot, &stats);
        dispatcher.dispatch(frame(StreamKind::Color, 4, 2, 2), true, &slot, &stats);

        assert_eq!(plugin.lock().unwrap().events, vec!["depth:1:4x2", "rgb:2:4x2"]);
        assert_eq!(stats.snapshot().single_dispatches, 2);
    }

    /// Paired hook without opting in through `synchronized()`
    #[derive(Default)]
    struct PairHookOnly {
        events: Vec<String>,
    }

    impl AlgorithmPlugin for PairHookOnly {
        fn process_depth_data(&mut self, depth: &[u16], _width: u32, _height: u32) -> eyre::Result<()> {
            self.events.push(format!("depth:{}", depth[0]));
            Ok(())
        }

        fn process_rgb_data(&mut self, rgb: &[u8], _width: u32, _height: u32) -> eyre::Result<()> {
            self.events.push(format!("rgb:{}", rgb[0]));
            Ok(())
        }

        fn process_synchronized_data(
            &mut self,
            depth: &[u16],
            rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> eyre::Result<()> {
            self.events.push(format!("sync:{}/{}", depth[0], rgb[0]));
            Ok(())
        }
    }

    #[test]
    fn paired_hook_needs_the_synchronized_flag() {
        let (plugin, slot) = setup(PairHookOnly::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 1), true, &slot, &stats);
        dispatcher.dispatch(frame(StreamKind::Color, 4, 2, 2), true, &slot, &stats);

        assert_eq!(plugin.lock().unwrap().events, vec!["depth:1", "rgb:2"]);
        assert_eq!(stats.snapshot().synchronized_dispatches, 0);
    }

    #[test]
    fn matching_pair_is_synchronized() {
        let (plugin, slot) = setup(PairRecorder::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Color, 4, 2, 9), true, &slot, &stats);
        assert!(plugin.lock().unwrap().events.is_empty());
        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 3), true, &slot, &stats);

        assert_eq!(plugin.lock().unwrap().events, vec!["sync:3/9"]);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.synchronized_dispatches, 1);
        assert_eq!(snapshot.single_dispatches, 0);
    }

    #[test]
    fn mismatched_dimensions_fall_back_to_single_hooks() {
        let (plugin, slot) = setup(PairRecorder::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Depth, 640, 480, 1), true, &slot, &stats);
        dispatcher.dispatch(frame(StreamKind::Color, 1280, 1024, 2), true, &slot, &stats);

        assert_eq!(plugin.lock().unwrap().events, vec!["depth:1:640x480", "rgb:2:1280x1024"]);
        assert_eq!(stats.snapshot().synchronized_dispatches, 0);
    }

    #[test]
    fn repeated_kind_closes_the_cycle() {
        let (plugin, slot) = setup(PairRecorder::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 1), true, &slot, &stats);
        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 2), true, &slot, &stats);
        dispatcher.dispatch(frame(StreamKind::Color, 4, 2, 3), true, &slot, &stats);

        // Depth #1 never pairs with a color frame from a later cycle
        assert_eq!(plugin.lock().unwrap().events, vec!["depth:1:4x2", "sync:2/3"]);
    }

    #[test]
    fn idle_partner_stream_skips_pairing() {
        let (plugin, slot) = setup(PairRecorder::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 5), false, &slot, &stats);
        assert_eq!(plugin.lock().unwrap().events, vec!["depth:5:4x2"]);
    }

    #[test]
    fn default_synchronized_hook_forwards_depth_then_color() {
        let (plugin, slot) = setup(Recorder {
            synchronized: true,
            ..Default::default()
        });
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Color, 4, 2, 7), true, &slot, &stats);
        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 6), true, &slot, &stats);

        assert_eq!(plugin.lock().unwrap().events, vec!["depth:6:4x2", "rgb:7:4x2"]);
        assert_eq!(stats.snapshot().synchronized_dispatches, 1);
    }

    #[test]
    fn cleared_slot_drops_held_frame() {
        let (plugin, slot) = setup(PairRecorder::default());
        let stats = CaptureStats::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(frame(StreamKind::Depth, 4, 2, 1), true, &slot, &stats);
        slot.clear();
        dispatcher.dispatch(frame(StreamKind::Color, 4, 2, 2), true, &slot, &stats);
        assert!(dispatcher.held.is_none());
        assert!(plugin.lock().unwrap().events.is_empty());
    }
}
