//! Processing plugin contract
//!
//! Users implement [`AlgorithmPlugin`] and register it with
//! [`DepthSensor::set_algorithm`](crate::DepthSensor::set_algorithm). The
//! sensor keeps only a weak reference: the plugin lives as long as the
//! caller's `Arc` does.
//!
//! Every hook runs on the capture thread and gates capture throughput. Hooks
//! must not block indefinitely; a hook that never returns prevents
//! `stop_capture` from completing.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use color_eyre::eyre;
use tracing::{debug, error, info};

use crate::error::{Result, SensorError};

/// Frame processing hooks invoked from the capture thread.
///
/// Frames arrive one at a time through [`process_depth_data`] and
/// [`process_rgb_data`] unless [`synchronized`] returns true. Overriding
/// [`process_synchronized_data`] alone has no effect: a plugin that wants
/// paired frames must also return true from [`synchronized`].
///
/// [`process_depth_data`]: Self::process_depth_data
/// [`process_rgb_data`]: Self::process_rgb_data
/// [`process_synchronized_data`]: Self::process_synchronized_data
/// [`synchronized`]: Self::synchronized
pub trait AlgorithmPlugin: Send {
    /// Called once before the plugin receives its first frame.
    fn on_initialize(&mut self) -> eyre::Result<()> {
        Ok(())
    }

    /// Called once after the plugin can no longer receive frames.
    fn on_shutdown(&mut self) -> eyre::Result<()> {
        Ok(())
    }

    /// Depth samples in millimeters, 0 where the sensor got no return.
    fn process_depth_data(&mut self, depth: &[u16], width: u32, height: u32) -> eyre::Result<()>;

    /// Packed 8-bit RGB triples.
    fn process_rgb_data(&mut self, rgb: &[u8], width: u32, height: u32) -> eyre::Result<()>;

    /// A depth and color frame from the same cycle with equal dimensions.
    ///
    /// Only used when [`synchronized`](Self::synchronized) returns true. The
    /// default forwards to the depth hook, then the color hook, and reports
    /// the first failure.
    fn process_synchronized_data(
        &mut self,
        depth: &[u16],
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> eyre::Result<()> {
        let depth_result = self.process_depth_data(depth, width, height);
        let rgb_result = self.process_rgb_data(rgb, width, height);
        depth_result.and(rgb_result)
    }

    /// Opt into paired depth + color delivery.
    fn synchronized(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "BaseAlgorithm"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }
}

pub type SharedAlgorithm = Arc<Mutex<dyn AlgorithmPlugin>>;

/// The currently registered plugin, held weakly.
///
/// The slot guard stays locked for the whole of a dispatch, so clearing or
/// replacing the plugin waits for an in-flight hook and no hook starts
/// afterwards.
#[derive(Default)]
pub struct AlgorithmSlot {
    registration: Mutex<Option<Registration>>,
}

struct Registration {
    plugin: Weak<Mutex<dyn AlgorithmPlugin>>,
    name: String,
    initialized: bool,
}

impl AlgorithmSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin`, retiring any previous one. With `initialize_now`
    /// the new plugin's `on_initialize` runs before it is installed; on
    /// failure nothing is installed.
    pub fn register(&self, plugin: &SharedAlgorithm, initialize_now: bool) -> Result<()> {
        let mut registration = self.lock();
        if let Some(previous) = registration.take() {
            retire(previous);
        }

        let (name, version, synchronized) = {
            let guard = lock_plugin(plugin);
            (
                guard.name().to_owned(),
                guard.version().to_owned(),
                guard.synchronized(),
            )
        };
        let mut next = Registration {
            plugin: Arc::downgrade(plugin),
            name,
            initialized: false,
        };
        if initialize_now {
            initialize(&mut next, plugin)?;
        }

        info!("Registered algorithm {} v{}", next.name, version);
        if synchronized {
            debug!("Algorithm {} receives paired depth and color frames", next.name);
        } else {
            debug!("Algorithm {} receives depth and color frames separately", next.name);
        }
        *registration = Some(next);
        Ok(())
    }

    /// Run `on_initialize` if the registered plugin has not seen it yet.
    pub fn initialize(&self) -> Result<()> {
        let mut registration = self.lock();
        let Some(current) = registration.as_mut() else {
            return Ok(());
        };
        if current.initialized {
            return Ok(());
        }
        match current.plugin.upgrade() {
            Some(plugin) => initialize(current, &plugin),
            None => {
                debug!("Algorithm {} dropped before initialization", current.name);
                *registration = None;
                Ok(())
            }
        }
    }

    /// Unregister the plugin, running `on_shutdown` if it was initialized.
    pub fn clear(&self) {
        if let Some(previous) = self.lock().take() {
            retire(previous);
        }
    }

    pub fn is_registered(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|current| current.plugin.strong_count() > 0)
    }

    pub fn name(&self) -> Option<String> {
        self.lock().as_ref().map(|current| current.name.clone())
    }

    /// Run `f` against the live plugin. Returns `None` when no plugin is
    /// registered or the caller has dropped it.
    pub(crate) fn with_plugin<R>(
        &self,
        f: impl FnOnce(&mut dyn AlgorithmPlugin, &str) -> R,
    ) -> Option<R> {
        let mut registration = self.lock();
        let current = registration.as_ref()?;
        let Some(plugin) = current.plugin.upgrade() else {
            debug!("Algorithm {} was dropped by its owner", current.name);
            *registration = None;
            return None;
        };
        let mut guard = lock_plugin(&plugin);
        Some(f(&mut *guard, &current.name))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Registration>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn initialize(registration: &mut Registration, plugin: &SharedAlgorithm) -> Result<()> {
    let mut guard = lock_plugin(plugin);
    invoke_hook("on_initialize", &registration.name, || guard.on_initialize())?;
    registration.initialized = true;
    Ok(())
}

fn retire(registration: Registration) {
    if !registration.initialized {
        return;
    }
    let Some(plugin) = registration.plugin.upgrade() else {
        return;
    };
    let mut guard = lock_plugin(&plugin);
    // Shutdown failures are reported but never block teardown
    let _ = invoke_hook("on_shutdown", &registration.name, || guard.on_shutdown());
}

fn lock_plugin(plugin: &SharedAlgorithm) -> MutexGuard<'_, dyn AlgorithmPlugin + 'static> {
    plugin.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatch boundary: run one hook, turning errors and panics into
/// [`SensorError::PluginHookFailure`] after logging them.
pub(crate) fn invoke_hook(
    hook: &'static str,
    plugin: &str,
    f: impl FnOnce() -> eyre::Result<()>,
) -> Result<()> {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    error!(plugin, hook, "Algorithm hook failed: {}", message);
    Err(SensorError::PluginHookFailure { hook, message })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
