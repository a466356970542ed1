use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_thread_names(true)
        .init();
}

/// Pin the calling thread to `core`, if one is configured
pub fn pin_current_thread(core: Option<usize>) {
    let Some(core) = core else {
        return;
    };

    let Some(core_id) = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
    else {
        warn!("CPU core {} not available, capture thread left unpinned", core);
        return;
    };

    if core_affinity::set_for_current(core_id) {
        info!("Capture thread pinned to core {}", core);
    } else {
        warn!("Failed to pin capture thread to core {}", core);
    }
}
