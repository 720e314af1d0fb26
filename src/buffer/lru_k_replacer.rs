use std::collections::{HashMap, VecDeque};

use crate::common::config::FrameId;

#[derive(Debug)]
struct FrameEntry {
    /// Timestamps of the most recent accesses, at most `k` of them.
    history: VecDeque<u64>,
    is_evictable: bool,
}

/// LRU-K replacement policy: the eviction victim is the evictable frame with
/// the largest backward k-distance. A frame with fewer than `k` recorded
/// accesses has +inf distance; ties among those are broken by the oldest
/// recorded access. Timestamps are a logical counter, not wall-clock time.
#[derive(Debug)]
pub struct LruKReplacer {
    frames: HashMap<FrameId, FrameEntry>,
    current_timestamp: u64,
    replacer_size: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1);
        Self {
            frames: HashMap::new(),
            current_timestamp: 0,
            replacer_size: num_frames,
            k,
        }
    }

    /// Evicts and forgets the frame with the largest backward k-distance.
    /// Returns `None` when no frame is evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        let mut victim: Option<(FrameId, bool, u64)> = None;
        for (&frame_id, entry) in &self.frames {
            if !entry.is_evictable {
                continue;
            }
            let (is_inf, timestamp) = if entry.history.len() < self.k {
                (true, entry.history.front().copied().unwrap_or(0))
            } else {
                (false, entry.history[entry.history.len() - self.k])
            };
            let better = match victim {
                None => true,
                Some((_, victim_inf, victim_ts)) => {
                    if is_inf != victim_inf {
                        is_inf
                    } else {
                        timestamp < victim_ts
                    }
                }
            };
            if better {
                victim = Some((frame_id, is_inf, timestamp));
            }
        }
        let (frame_id, _, _) = victim?;
        self.frames.remove(&frame_id);
        Some(frame_id)
    }

    /// Records an access to `frame_id` at the current logical time. Newly
    /// seen frames start out non-evictable, i.e. pinned.
    pub fn record_access(&mut self, frame_id: FrameId) {
        debug_assert!(frame_id < self.replacer_size);
        self.current_timestamp += 1;
        let now = self.current_timestamp;
        let entry = self.frames.entry(frame_id).or_insert_with(|| FrameEntry {
            history: VecDeque::new(),
            is_evictable: false,
        });
        entry.history.push_back(now);
        if entry.history.len() > self.k {
            entry.history.pop_front();
        }
    }

    /// Marks `frame_id` evictable or pinned.
    pub fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        debug_assert!(frame_id < self.replacer_size);
        if let Some(entry) = self.frames.get_mut(&frame_id) {
            entry.is_evictable = is_evictable;
        }
    }

    /// Forgets `frame_id` entirely, e.g. after its page was deleted.
    ///
    /// # Panics
    ///
    /// Panics when the frame is tracked but not evictable.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(entry) = self.frames.get(&frame_id) {
            assert!(
                entry.is_evictable,
                "attempt to remove the pinned frame {} from the replacer",
                frame_id
            );
            self.frames.remove(&frame_id);
        }
    }

    /// The number of evictable frames.
    pub fn size(&self) -> usize {
        self.frames.values().filter(|e| e.is_evictable).count()
    }
}
