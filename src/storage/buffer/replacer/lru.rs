use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU (Least Recently Used) page replacement policy.
///
/// Tracks the frames that are eligible for eviction, ordered by the time of
/// their most recent unpin. The insertion-ordered map gives all four
/// operations O(1) cost.
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

struct LruInner {
    /// Front = least recently unpinned, back = most recently unpinned
    order: LinkedHashMap<FrameId, ()>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                order: LinkedHashMap::with_capacity(num_frames),
                capacity: num_frames,
            }),
        }
    }

    /// Select and remove the frame whose most recent unpin is oldest
    pub fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        inner.order.pop_front().map(|(frame_id, _)| frame_id)
    }

    /// Remove a frame from the candidate set; no-op when absent.
    /// Called when a frame's pin count leaves zero.
    pub fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.order.remove(&frame_id);
    }

    /// Insert a frame as the most recently used candidate; no-op when
    /// already present. Called when a frame's pin count reaches zero.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.order.contains_key(&frame_id) {
            return;
        }
        if inner.order.len() >= inner.capacity {
            inner.order.pop_front();
        }
        inner.order.insert(frame_id, ());
    }

    /// Number of frames currently eligible for eviction
    pub fn size(&self) -> usize {
        self.inner.lock().order.len()
    }
}
