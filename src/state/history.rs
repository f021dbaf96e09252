use super::CompactState;
use crate::DEFAULT_HISTORY_CAPACITY;
use crate::collections::CircularBuffer;

/// bounded ring of snapshots for pattern analysis
///
/// `kth_back(0)` is the newest snapshot; the analytic folds walk
/// oldest-first over the newest `n`. overflow evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    ring: CircularBuffer<CompactState>,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        log::debug!("history ring capacity {}", capacity);
        Self {
            ring: CircularBuffer::new(capacity),
        }
    }

    pub fn record(&mut self, state: CompactState) {
        self.ring.push_back(state);
        log::trace!("recorded state, history size {}", self.ring.len());
    }

    /// k steps back from the newest; 0 = most recent
    pub fn kth_back(&self, k: usize) -> Option<CompactState> {
        let len = self.ring.len();
        if k >= len {
            return None;
        }
        self.ring.get(len - 1 - k).copied()
    }

    /// owned copy of the newest n snapshots, oldest-first
    pub fn recent(&self, n: usize) -> Vec<CompactState> {
        self.ring.window(n)
    }

    /// face counts over the newest n snapshots; index 0 unused.
    /// only the first `dice_count` slots of each snapshot count.
    pub fn dice_frequency(&self, last_n: usize) -> [u32; 7] {
        let mut frequency = [0u32; 7];
        for state in self.recent(last_n) {
            let dice = state.dice();
            for face in dice.iter().take(state.dice_count() as usize) {
                if (1..=6).contains(face) {
                    frequency[*face as usize] += 1;
                }
            }
        }
        frequency
    }

    pub fn avg_dice_count(&self, last_n: usize) -> f64 {
        let recent = self.recent(last_n);
        if recent.is_empty() {
            return 0.0;
        }
        let total: u64 = recent.iter().map(|s| s.dice_count() as u64).sum();
        total as f64 / recent.len() as f64
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// keeps the newest entries when shrinking
    pub fn resize(&mut self, capacity: usize) {
        self.ring.set_capacity(capacity);
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
