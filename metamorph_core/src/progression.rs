use bevy::prelude::{Res, ResMut, Resource};
use tracing::info;

use crate::catalog::Order;
use crate::history::{HistoryEvent, HistoryLog};
use crate::resources::{EngineClock, SimulationTick};
use crate::world_state::WorldSnapshot;

/// Discrete transformation stage gating which mutation orders are reachable.
///
/// `phase` only ever climbs. Advancing past an order permanently zeroes that
/// order's unlock threshold, so the unlock survives later progress dips.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct ProgressionGate {
    phase: u8,
    thresholds: [f32; 5],
}

impl Default for ProgressionGate {
    fn default() -> Self {
        Self {
            phase: 1,
            thresholds: [0.0, 0.25, 0.5, 0.75, 0.9],
        }
    }
}

impl ProgressionGate {
    pub fn phase(&self) -> u8 {
        self.phase
    }

    pub fn threshold(&self, order: Order) -> f32 {
        self.thresholds[usize::from(u8::from(order)) - 1]
    }

    pub fn is_order_admissible(&self, order: Order, progress: f32) -> bool {
        progress >= self.threshold(order)
    }

    /// Advances the phase if `progress` has crossed the next gate, zeroing the
    /// thresholds of every order at or below the new phase. Returns the
    /// `(from, to)` pair on change.
    pub fn maybe_advance(&mut self, progress: f32) -> Option<(u8, u8)> {
        let target = if progress >= 0.9 && self.phase < 5 {
            5
        } else if progress >= 0.7 && self.phase < 4 {
            4
        } else if progress >= 0.5 && self.phase < 3 {
            3
        } else if progress >= 0.25 && self.phase < 2 {
            2
        } else {
            return None;
        };
        let from = self.phase;
        self.set_phase(target);
        Some((from, target))
    }

    /// Used on checkpoint restore. Re-applies the phase/threshold invariant
    /// regardless of what the stored thresholds claim.
    pub fn restore(phase: u8, thresholds: [f32; 5]) -> Self {
        let mut gate = Self {
            phase: 1,
            thresholds,
        };
        gate.set_phase(phase.clamp(1, 5));
        gate
    }

    fn set_phase(&mut self, phase: u8) {
        self.phase = self.phase.max(phase);
        for order in 2..=usize::from(self.phase) {
            self.thresholds[order - 1] = 0.0;
        }
    }
}

/// Continuous 0-1 transformation score: weighted mix of discovered symbols
/// (out of 20), completed rituals (out of 10), rebirth cycles (out of 5) and
/// the aggregate anomaly level.
pub fn transformation_progress(symbols: usize, rituals: usize, cycles: u32, anomaly: f32) -> f32 {
    let symbol_progress = (symbols as f32 / 20.0).min(1.0);
    let ritual_progress = (rituals as f32 / 10.0).min(1.0);
    let cycle_progress = (cycles as f32 / 5.0).min(1.0);
    symbol_progress * 0.3 + ritual_progress * 0.3 + cycle_progress * 0.2 + anomaly * 0.2
}

pub fn advance_progression(
    tick: Res<SimulationTick>,
    clock: Res<EngineClock>,
    snapshot: Res<WorldSnapshot>,
    mut gate: ResMut<ProgressionGate>,
    mut history: ResMut<HistoryLog>,
) {
    if let Some((from, to)) = gate.maybe_advance(snapshot.progress()) {
        info!(
            target: "metamorph::progression",
            from,
            to,
            progress = snapshot.progress(),
            "phase.advanced"
        );
        history.record(tick.0, clock.elapsed, HistoryEvent::PhaseChanged { from, to });
    }
}
