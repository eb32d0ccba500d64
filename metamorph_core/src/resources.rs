use bevy::prelude::{ResMut, Resource};
use rand::rngs::SmallRng;

/// Global tuning parameters for the metamorphosis engine.
#[derive(Resource, Debug, Clone)]
pub struct EngineConfig {
    /// Seed for the engine-owned generator; fixing it makes runs
    /// reproducible.
    pub world_seed: u64,
    pub starting_budget: f32,
    pub regen_per_minute: f32,
    /// Added to the budget ceiling on every rebirth.
    pub rebirth_budget_bonus: f32,
    /// Length of a full day/night cycle in simulated seconds.
    pub day_length_secs: f32,
    pub action_history_cap: usize,
    pub history_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_seed: 0x5EED_0D15_EA5E,
            starting_budget: 100.0,
            regen_per_minute: 0.5,
            rebirth_budget_bonus: 25.0,
            day_length_secs: 1200.0,
            action_history_cap: 100,
            history_cap: 1000,
        }
    }
}

/// Tracks total simulation ticks elapsed.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);

/// Simulated wall clock driven by the caller via [`crate::run_tick`].
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct EngineClock {
    /// Seconds elapsed up to the start of the current tick.
    pub elapsed: f64,
    /// Seconds covered by the current tick.
    pub delta: f32,
}

/// Monotonic id source for effect and trigger instances. Never reused within
/// a run and persisted across checkpoints so restored ids cannot collide.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn resume_from(next: u64) -> Self {
        Self { next }
    }

    pub fn next_value(&self) -> u64 {
        self.next
    }

    pub fn allocate(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{prefix}#{}", self.next)
    }
}

/// Single deterministic generator shared by the scheduler and registry.
#[derive(Resource, Debug, Clone)]
pub struct EngineRng(pub SmallRng);

pub fn advance_tick(mut tick: ResMut<SimulationTick>, mut clock: ResMut<EngineClock>) {
    tick.0 = tick.0.wrapping_add(1);
    clock.elapsed += f64::from(clock.delta);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ids_are_unique_and_prefixed() {
        let mut ids = IdAllocator::default();
        let a = ids.allocate("gravity_well");
        let b = ids.allocate("gravity_well");
        assert_ne!(a, b);
        assert!(a.starts_with("gravity_well#"));
    }

    #[test]
    fn resume_continues_past_persisted_ids() {
        let mut ids = IdAllocator::default();
        ids.allocate("fx");
        ids.allocate("fx");
        let mut resumed = IdAllocator::resume_from(ids.next_value());
        assert_eq!(resumed.allocate("fx"), "fx#3");
    }
}
