//! Latest-frame store, one exclusive guard per stream kind

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::capture::frame::{Frame, FrameError, StreamKind};

/// Latest-frame-wins store for a single stream
pub struct FrameBuffer {
    kind: StreamKind,
    slot: Mutex<Slot>,
}

struct Slot {
    current: Option<Frame>,
    /// Bytes reserved for the negotiated resolution
    capacity: usize,
    writes: u64,
}

impl FrameBuffer {
    pub fn new(kind: StreamKind, capacity: usize) -> Self {
        Self {
            kind,
            slot: Mutex::new(Slot {
                current: None,
                capacity,
                writes: 0,
            }),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Resize for a newly negotiated mode. Drops the current frame when it
    /// no longer fits.
    pub fn reserve(&self, capacity: usize) {
        let mut slot = self.lock();
        slot.capacity = capacity;
        if slot
            .current
            .as_ref()
            .is_some_and(|frame| frame.data.len() > capacity)
        {
            slot.current = None;
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Replace the current frame.
    pub fn write(&self, frame: Frame) -> Result<(), FrameError> {
        if frame.kind() != self.kind {
            return Err(FrameError::KindMismatch {
                expected: self.kind,
                actual: frame.kind(),
            });
        }

        let mut slot = self.lock();
        if frame.data.len() > slot.capacity {
            return Err(FrameError::CapacityExceeded {
                kind: self.kind,
                capacity: slot.capacity,
                actual: frame.data.len(),
            });
        }
        slot.current = Some(frame);
        slot.writes += 1;
        Ok(())
    }

    /// Current frame, or `None` when nothing has been written yet.
    ///
    /// The returned frame shares the immutable payload, so it stays intact
    /// however many writes follow.
    pub fn read_snapshot(&self) -> Option<Frame> {
        self.lock().current.clone()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.lock().current.as_ref().map(Frame::dimensions)
    }

    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    pub fn clear(&self) {
        self.lock().current = None;
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Writers replace the frame in a single assignment, a poisoned slot
        // still holds a whole frame
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Depth and color buffers, independently guarded
pub struct FrameBuffers {
    pub depth: FrameBuffer,
    pub color: FrameBuffer,
}

impl FrameBuffers {
    pub fn new(depth_capacity: usize, color_capacity: usize) -> Self {
        Self {
            depth: FrameBuffer::new(StreamKind::Depth, depth_capacity),
            color: FrameBuffer::new(StreamKind::Color, color_capacity),
        }
    }

    pub fn get(&self, kind: StreamKind) -> &FrameBuffer {
        match kind {
            StreamKind::Depth => &self.depth,
            StreamKind::Color => &self.color,
        }
    }

    pub fn write(&self, frame: Frame) -> Result<(), FrameError> {
        self.get(frame.kind()).write(frame)
    }

    pub fn clear(&self) {
        self.depth.clear();
        self.color.clear();
    }
}
