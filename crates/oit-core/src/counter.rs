use std::sync::atomic::{AtomicU32, Ordering};

use crate::node::SENTINEL;

/// Frame-wide slot allocator: a single fetch-and-add shared by every capture invocation.
///
/// Values at or past the arena capacity are still handed out; the caller is
/// responsible for discarding them. The counter therefore keeps growing after
/// exhaustion, which is how the frame's overrun is observed. It saturates at
/// [`FragmentCounter::LIMIT`] instead of wrapping: past that point every call
/// returns [`SENTINEL`], which no valid capacity reaches.
#[derive(Debug, Default)]
pub struct FragmentCounter {
    next: AtomicU32,
}

impl FragmentCounter {
    /// Requests per frame after which every allocation fails. Also the largest
    /// arena capacity an [`ABufferDesc`](crate::ABufferDesc) accepts. The
    /// capture shader saturates at the same value.
    pub const LIMIT: u32 = oit_shaders::COUNTER_LIMIT;

    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next slot index, or [`SENTINEL`] once the frame has made
    /// [`Self::LIMIT`] requests.
    #[inline]
    pub fn allocate(&self) -> u32 {
        let slot = self.next.fetch_add(1, Ordering::Relaxed);
        if slot >= Self::LIMIT {
            // pull the count back so a long overrun never wraps to zero
            self.next.store(Self::LIMIT, Ordering::Relaxed);
            return SENTINEL;
        }
        slot
    }

    /// Number of slots requested so far this frame, capped at [`Self::LIMIT`].
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed).min(Self::LIMIT)
    }

    pub fn reset(&mut self) {
        *self.next.get_mut() = 0;
    }
}
