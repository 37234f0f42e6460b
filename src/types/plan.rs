//! Per-second arrival plan

use serde::{Deserialize, Serialize};

/// Packets to send in each second of a run, drawn once before the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalPlan {
    counts: Vec<u32>,
}

impl ArrivalPlan {
    pub fn new(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    /// Number of seconds covered by the plan.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Packet count for `second`, if it is inside the plan.
    pub fn count_at(&self, second: usize) -> Option<u32> {
        self.counts.get(second).copied()
    }

    /// `(second index, packet count)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.counts.iter().copied().enumerate()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Total packets planned over the whole run.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}
