pub mod driver;
pub mod mode;
pub mod session;
pub mod simulated;

pub use driver::{Driver, DriverError};
pub use mode::{ColorMode, DepthFormat, DepthMode, LedState, Resolution, StreamSet};
pub use session::{DeviceSession, SessionState, SharedSession, MAX_TILT_DEGREES, MIN_TILT_DEGREES};
pub use simulated::{SimulatedConfig, SimulatedDriver};
