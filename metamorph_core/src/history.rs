use std::collections::VecDeque;

use bevy::prelude::Resource;

/// Diagnostic record of a single engine decision.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    Admitted { effect: String, cost: f32 },
    Expired { effect: String, refund: f32 },
    Removed { effect: String, refund: f32 },
    AppliedToObject { effect: String, object: u64 },
    RemovedFromObject { effect: String, object: u64 },
    PhaseChanged { from: u8, to: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub tick: u64,
    pub at: f64,
    pub event: HistoryEvent,
}

/// Bounded append-only log of admit/expire/phase-change events. Oldest
/// entries are evicted once the cap is reached.
#[derive(Resource, Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    cap: usize,
}

impl HistoryLog {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
        }
    }

    pub fn record(&mut self, tick: u64, at: f64, event: HistoryEvent) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { tick, at, event });
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(1000)
    }
}
