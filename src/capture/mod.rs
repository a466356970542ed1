pub mod buffer;
mod dispatch;
pub mod frame;
pub mod stats;
pub mod thread;

pub use buffer::{FrameBuffer, FrameBuffers};
pub use frame::{Frame, FrameError, FrameMetadata, RawFrame, StreamKind};
pub use stats::{CaptureStats, StatsSnapshot};
pub use thread::{CaptureContext, CaptureState, CaptureThread};
