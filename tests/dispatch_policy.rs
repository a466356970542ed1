mod common;

use std::sync::{Arc, Mutex};

use color_eyre::eyre;
use common::{fast_config, initialized_sensor, sensor, wait_until, Probe};
use depthlink::{AlgorithmPlugin, ColorMode, Resolution};

#[test]
fn unsynchronized_plugin_sees_both_streams() {
    let mut sensor = initialized_sensor();
    let probe = Probe::default().shared();
    sensor.set_algorithm(&probe).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| {
        let probe = probe.lock().unwrap();
        probe.depth_calls >= 3 && probe.rgb_calls >= 3
    }));
    sensor.stop_capture().unwrap();

    let probe = probe.lock().unwrap();
    assert_eq!(probe.sync_calls, 0);
    assert_eq!(probe.last_depth_dims, Some((640, 480)));
    assert_eq!(probe.last_rgb_dims, Some((640, 480)));
    assert_eq!(sensor.stats().plugin_failures, 0);
}

#[test]
fn matching_streams_are_delivered_as_pairs() {
    let mut sensor = initialized_sensor();
    let probe = Probe {
        synchronized: true,
        ..Default::default()
    }
    .shared();
    sensor.set_algorithm(&probe).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| probe.lock().unwrap().sync_calls >= 3));
    sensor.stop_capture().unwrap();

    let probe = probe.lock().unwrap();
    assert_eq!(probe.depth_calls, 0);
    assert_eq!(probe.rgb_calls, 0);
    let stats = sensor.stats();
    assert_eq!(stats.synchronized_dispatches, probe.sync_calls);
    assert_eq!(stats.plugin_failures, 0);
}

#[test]
fn mismatched_dimensions_never_synchronize() {
    let mut config = fast_config();
    config.device.color = ColorMode {
        resolution: Resolution::High,
    };
    let mut sensor = sensor(config);
    sensor.initialize().unwrap();
    assert_eq!(sensor.rgb_dimensions(), Some((1280, 1024)));

    let probe = Probe {
        synchronized: true,
        ..Default::default()
    }
    .shared();
    sensor.set_algorithm(&probe).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| {
        let probe = probe.lock().unwrap();
        probe.depth_calls >= 3 && probe.rgb_calls >= 3
    }));
    sensor.stop_capture().unwrap();

    let probe = probe.lock().unwrap();
    assert_eq!(probe.sync_calls, 0);
    assert_eq!(probe.last_depth_dims, Some((640, 480)));
    assert_eq!(probe.last_rgb_dims, Some((1280, 1024)));
    assert_eq!(sensor.stats().synchronized_dispatches, 0);
}

#[test]
fn synchronized_plugin_with_single_stream_gets_single_frames() {
    let mut config = fast_config();
    config.capture.color = false;
    let mut sensor = sensor(config);
    sensor.initialize().unwrap();

    let probe = Probe {
        synchronized: true,
        ..Default::default()
    }
    .shared();
    sensor.set_algorithm(&probe).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| probe.lock().unwrap().depth_calls >= 3));
    sensor.stop_capture().unwrap();

    let probe = probe.lock().unwrap();
    assert_eq!(probe.sync_calls, 0);
    assert_eq!(probe.rgb_calls, 0);
    assert!(sensor.rgb_data().is_none());
}

#[test]
fn failing_depth_hook_does_not_stop_the_stream() {
    let mut sensor = initialized_sensor();
    let probe = Probe {
        fail_depth_call: Some(3),
        ..Default::default()
    }
    .shared();
    sensor.set_algorithm(&probe).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| probe.lock().unwrap().depth_calls >= 4));
    sensor.stop_capture().unwrap();

    assert_eq!(sensor.stats().plugin_failures, 1);
}

#[test]
fn panicking_depth_hook_does_not_stop_the_stream() {
    let mut sensor = initialized_sensor();
    let probe = Probe {
        panic_depth_call: Some(3),
        ..Default::default()
    }
    .shared();
    sensor.set_algorithm(&probe).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| probe.lock().unwrap().depth_calls >= 4));
    sensor.stop_capture().unwrap();

    assert_eq!(sensor.stats().plugin_failures, 1);
    assert!(probe.lock().unwrap().rgb_calls >= 3);
}

/// Overrides only the single-stream hooks
#[derive(Default)]
struct OrderRecorder {
    events: Vec<&'static str>,
}

impl AlgorithmPlugin for OrderRecorder {
    fn process_depth_data(&mut self, _: &[u16], _: u32, _: u32) -> eyre::Result<()> {
        self.events.push("depth");
        Ok(())
    }

    fn process_rgb_data(&mut self, _: &[u8], _: u32, _: u32) -> eyre::Result<()> {
        self.events.push("rgb");
        Ok(())
    }

    fn synchronized(&self) -> bool {
        true
    }
}

#[test]
fn default_synchronized_hook_forwards_depth_then_color() {
    let mut sensor = initialized_sensor();
    let recorder = Arc::new(Mutex::new(OrderRecorder::default()));
    sensor.set_algorithm(&recorder).unwrap();

    sensor.start_capture().unwrap();
    assert!(wait_until(|| recorder.lock().unwrap().events.len() >= 6));
    sensor.stop_capture().unwrap();

    assert!(sensor.stats().synchronized_dispatches >= 3);
    let events = recorder.lock().unwrap().events.clone();
    let even = events.len() - events.len() % 2;
    for pair in events[..even].chunks(2) {
        assert_eq!(pair, ["depth", "rgb"]);
    }
}

#[test]
fn default_metadata() {
    let recorder = OrderRecorder::default();
    assert_eq!(recorder.name(), "BaseAlgorithm");
    assert_eq!(recorder.version(), "1.0.0");
}
