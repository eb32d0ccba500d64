use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bevy::prelude::World;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::budget::BudgetLedger;
use crate::catalog::{EffectCatalogHandle, EffectInstance};
use crate::progression::ProgressionGate;
use crate::registry::ActiveEffects;
use crate::resources::{EngineClock, IdAllocator, SimulationTick};
use crate::world_state::{WorldConditions, WorldSnapshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read checkpoint from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write checkpoint to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse checkpoint: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One live instance as persisted: identity, originating template and how
/// far into its duration it was, so reloaded effects do not restart their
/// timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEffect {
    pub id: String,
    pub template_id: String,
    pub elapsed_secs: f64,
}

/// Serialized engine state: ledger, gate, live-instance identities and the
/// auxiliary world facts trigger checks depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    pub budget_available: f32,
    pub budget_max: f32,
    pub regen_per_minute: f32,
    pub phase: u8,
    pub order_thresholds: [f32; 5],
    pub active_effects: Vec<SavedEffect>,
    pub conditions: WorldConditions,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub next_id: u64,
}

pub fn capture_checkpoint(world: &World) -> SaveState {
    let ledger = world.resource::<BudgetLedger>();
    let gate = world.resource::<ProgressionGate>();
    let clock = world.resource::<EngineClock>();
    let active = world.resource::<ActiveEffects>();
    let now = clock.elapsed;

    let active_effects = active
        .iter()
        .map(|instance| SavedEffect {
            id: instance.id.clone(),
            template_id: instance.template.id.clone(),
            elapsed_secs: (now - instance.admitted_at).max(0.0),
        })
        .collect();
    let order_thresholds =
        std::array::from_fn(|index| gate.threshold(crate::catalog::Order::ALL[index]));

    SaveState {
        budget_available: ledger.available(),
        budget_max: ledger.max(),
        regen_per_minute: ledger.regen_per_minute(),
        phase: gate.phase(),
        order_thresholds,
        active_effects,
        conditions: world.resource::<WorldConditions>().clone(),
        tick: world.resource::<SimulationTick>().0,
        elapsed_secs: now,
        next_id: world.resource::<IdAllocator>().next_value(),
    }
}

pub fn save_checkpoint(world: &World, path: &Path) -> Result<(), PersistenceError> {
    let state = capture_checkpoint(world);
    let data = serde_json::to_string_pretty(&state)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(path, data).map_err(|source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        target: "metamorph::persistence",
        path = %path.display(),
        live_effects = state.active_effects.len(),
        "checkpoint.saved"
    );
    Ok(())
}

pub fn load_checkpoint(path: &Path) -> Result<SaveState, PersistenceError> {
    let contents = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Reconstructs the ledger and gate verbatim and rebuilds each live instance
/// as a fresh copy of its template, re-stamped with the saved id and elapsed
/// time. Instances whose template no longer exists are skipped with a
/// warning.
pub fn restore_checkpoint(world: &mut World, state: SaveState) {
    let catalog = world.resource::<EffectCatalogHandle>().get();

    let mut active = ActiveEffects::default();
    for saved in &state.active_effects {
        let Some(template) = catalog.template(&saved.template_id) else {
            warn!(
                target: "metamorph::persistence",
                effect = %saved.id,
                template = %saved.template_id,
                "restore.skipped=unknown_template"
            );
            continue;
        };
        active.insert(EffectInstance {
            id: saved.id.clone(),
            template: template.clone(),
            admitted_at: state.elapsed_secs - saved.elapsed_secs,
        });
    }

    let live_effects = active.len();
    world.insert_resource(active);
    world.insert_resource(BudgetLedger::new(
        state.budget_available,
        state.budget_max,
        state.regen_per_minute,
    ));
    world.insert_resource(ProgressionGate::restore(state.phase, state.order_thresholds));
    world.insert_resource(state.conditions);
    world.insert_resource(SimulationTick(state.tick));
    world.insert_resource(EngineClock {
        elapsed: state.elapsed_secs,
        delta: 0.0,
    });
    world.insert_resource(IdAllocator::resume_from(state.next_id));
    world.insert_resource(WorldSnapshot::default());
    info!(
        target: "metamorph::persistence",
        tick = state.tick,
        live_effects,
        phase = state.phase,
        "checkpoint.restored"
    );
}

/// Best-effort restore: a missing or corrupt checkpoint is logged and leaves
/// the default-initialized state in place. Returns whether a restore
/// happened.
pub fn load_checkpoint_or_default(world: &mut World, path: &Path) -> bool {
    match load_checkpoint(path) {
        Ok(state) => {
            restore_checkpoint(world, state);
            true
        }
        Err(err) => {
            warn!(
                target: "metamorph::persistence",
                path = %path.display(),
                error = %err,
                "checkpoint.load_failed=using_defaults"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SaveState {
        SaveState {
            budget_available: 82.0,
            budget_max: 125.0,
            regen_per_minute: 0.5,
            phase: 3,
            order_thresholds: [0.0, 0.0, 0.0, 0.75, 0.9],
            active_effects: vec![SavedEffect {
                id: "gravity_well#4".into(),
                template_id: "gravity_well".into(),
                elapsed_secs: 42.0,
            }],
            conditions: WorldConditions::default(),
            tick: 512,
            elapsed_secs: 1024.0,
            next_id: 9,
        }
    }

    #[test]
    fn save_state_round_trips_through_json() {
        let state = sample_state();
        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: SaveState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.budget_available, 82.0);
        assert_eq!(back.phase, 3);
        assert_eq!(back.active_effects.len(), 1);
        assert_eq!(back.active_effects[0].elapsed_secs, 42.0);
        assert_eq!(back.next_id, 9);
    }

    #[test]
    fn missing_checkpoint_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_checkpoint(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, PersistenceError::Read { .. }));
    }

    #[test]
    fn corrupt_checkpoint_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_checkpoint(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::Parse(_)));
    }
}
