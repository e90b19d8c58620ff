use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single frame
#[derive(Debug)]
struct FrameRecord {
    /// Last up-to-k access timestamps, most recent at the back
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl FrameRecord {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance from `current_timestamp`; None encodes +inf
    /// (fewer than k recorded accesses).
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    /// Oldest recorded timestamp. For a frame with fewer than k accesses
    /// this is its first access; for a warm frame it is the k-th previous
    /// access. Both are exactly the tie-break each class needs.
    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

#[derive(Debug)]
struct ReplacerState {
    records: HashMap<FrameId, FrameRecord>,
    num_evictable: usize,
}

/// LRU-K replacement policy over a fixed universe of frame slots.
///
/// The replacer evicts the frame whose backward k-distance (time since its
/// k-th previous access) is largest. Frames with fewer than k accesses have
/// +inf distance and are preferred; among those the one with the earliest
/// first access goes first.
pub struct LruKReplacer {
    k: usize,
    /// Frame ids must be below this bound
    capacity: usize,
    /// Monotonically increasing logical clock
    current_timestamp: AtomicU64,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        assert!(k > 0);
        Self {
            k,
            capacity,
            current_timestamp: AtomicU64::new(0),
            state: Mutex::new(ReplacerState {
                records: HashMap::new(),
                num_evictable: 0,
            }),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance and
    /// drops its history. Returns None when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let current_ts = self.current_timestamp.load(Ordering::Relaxed);

        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Option<Timestamp> = None;

        for (frame_id, record) in state.records.iter() {
            if !record.is_evictable {
                continue;
            }

            let k_dist = record.k_distance(current_ts, self.k);
            let earliest_ts = record.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // victim is +inf, candidate finite: keep victim
                (None, Some(_)) => false,
                // candidate is +inf, victim finite: take candidate
                (Some(_), None) => true,
                // both +inf: earlier first access wins
                (None, None) => match (victim_earliest_ts, earliest_ts) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (None, Some(_)) => true,
                    _ => false,
                },
                // both finite: larger distance wins
                (Some(v_dist), Some(c_dist)) => c_dist > v_dist,
            };

            if victim.is_none() || should_replace {
                victim = Some(*frame_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(frame_id) = victim {
            state.records.remove(&frame_id);
            state.num_evictable -= 1;
        }

        victim
    }

    /// Records an access to `frame_id` at the current logical time,
    /// creating the record on first access.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.capacity,
            "frame id {} out of range (capacity {})",
            frame_id,
            self.capacity
        );

        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        state
            .records
            .entry(frame_id)
            .or_insert_with(FrameRecord::new)
            .record_access(timestamp, self.k);
    }

    /// Toggles a frame's evictable flag. Unknown frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        assert!(
            frame_id.as_usize() < self.capacity,
            "frame id {} out of range (capacity {})",
            frame_id,
            self.capacity
        );

        let mut state = self.state.lock();
        let ReplacerState {
            records,
            num_evictable,
        } = &mut *state;
        let Some(record) = records.get_mut(&frame_id) else {
            return;
        };

        if record.is_evictable != is_evictable {
            record.is_evictable = is_evictable;
            if is_evictable {
                *num_evictable += 1;
            } else {
                *num_evictable -= 1;
            }
        }
    }

    /// Drops a frame's record entirely. Unknown frames are a no-op; removing
    /// a frame that is known but pinned is a caller bug.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let Some(record) = state.records.get(&frame_id) else {
            return;
        };
        assert!(
            record.is_evictable,
            "cannot remove non-evictable frame {}",
            frame_id
        );

        state.records.remove(&frame_id);
        state.num_evictable -= 1;
    }

    /// Number of currently evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
