//! Metamorphosis engine core: budget-gated, trigger-driven world mutation.
//!
//! Provides deterministic ECS systems that resolve a single engine tick when
//! [`run_tick`] is invoked: drain inbound events → regenerate the anomaly
//! budget → rebuild the world snapshot → advance the progression gate →
//! evaluate triggers (at most one admission per tick) → expire and update
//! live effects → reconcile per-object state.

mod budget;
mod catalog;
mod components;
mod handlers;
mod history;
mod persistence;
mod progression;
mod region;
mod registry;
mod resources;
mod trigger;
mod world_state;

use bevy::prelude::*;
use rand::{rngs::SmallRng, SeedableRng};

pub use budget::{effect_cost, BudgetLedger, REMOVAL_REFUND_RATIO};
pub use catalog::{
    load_effect_catalog_from_env, load_trigger_catalog_from_env, CatalogError, Category, Compare,
    EffectCatalog, EffectCatalogHandle, EffectInstance, EffectTemplate, Order, ThresholdMetric,
    TriggerCatalog, TriggerCatalogHandle, TriggerKind, TriggerTemplate, BUILTIN_EFFECT_TEMPLATES,
    BUILTIN_TRIGGER_TEMPLATES,
};
pub use components::{
    AudioEmitter, CreatureStats, Metamorphic, PhysicsState, PlayerVitals, RenderState, TagSet,
    WorldPosition,
};
pub use handlers::HandlerError;
pub use history::{HistoryEntry, HistoryEvent, HistoryLog};
pub use persistence::{
    capture_checkpoint, load_checkpoint, load_checkpoint_or_default, restore_checkpoint,
    save_checkpoint, PersistenceError, SaveState, SavedEffect,
};
pub use progression::{transformation_progress, ProgressionGate};
pub use region::{Falloff, Region, RegionShape, MIN_INFLUENCE_WEIGHT};
pub use registry::{
    admit_from_template, object_matches, remove_effect, ActiveEffects, EffectSummary,
};
pub use resources::{EngineClock, EngineConfig, EngineRng, IdAllocator, SimulationTick};
pub use trigger::{TriggerInstance, TriggerPool};
pub use world_state::{
    EngineEventSender, PlayerAction, TaggedLocation, WorldConditions, WorldSnapshot,
};

/// Construct a headless Bevy [`App`] wired with the metamorphosis tick
/// pipeline and default configuration.
pub fn build_headless_app() -> App {
    build_app_with_config(EngineConfig::default())
}

/// Construct the engine app with explicit configuration. Catalogs come from
/// the `METAMORPH_EFFECTS_PATH` / `METAMORPH_TRIGGERS_PATH` overrides when
/// set and fall back to the builtin template sets.
pub fn build_app_with_config(config: EngineConfig) -> App {
    let mut app = App::new();

    let (sender, inbox) = world_state::engine_channel();
    let effect_catalog = catalog::load_effect_catalog_from_env();
    let trigger_catalog = catalog::load_trigger_catalog_from_env();
    let mut ids = IdAllocator::default();
    let pool = TriggerPool::seeded(&trigger_catalog, &mut ids);
    let ledger = BudgetLedger::new(
        config.starting_budget,
        config.starting_budget,
        config.regen_per_minute,
    );
    let history = HistoryLog::with_capacity(config.history_cap);
    let rng = EngineRng(SmallRng::seed_from_u64(config.world_seed));

    app.insert_resource(sender)
        .insert_resource(inbox)
        .insert_resource(EffectCatalogHandle::new(effect_catalog))
        .insert_resource(TriggerCatalogHandle::new(trigger_catalog))
        .insert_resource(pool)
        .insert_resource(ids)
        .insert_resource(ledger)
        .insert_resource(history)
        .insert_resource(rng)
        .insert_resource(config)
        .insert_resource(SimulationTick::default())
        .insert_resource(EngineClock::default())
        .insert_resource(ProgressionGate::default())
        .insert_resource(ActiveEffects::default())
        .insert_resource(WorldConditions::default())
        .insert_resource(WorldSnapshot::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                world_state::drain_engine_inbox,
                budget::regenerate_budget,
                world_state::rebuild_world_snapshot,
                progression::advance_progression,
                trigger::evaluate_triggers,
                registry::update_active_effects,
                registry::reconcile_objects,
                resources::advance_tick,
            )
                .chain(),
        );

    app
}

/// Execute a single engine tick covering `delta_secs` of simulated time.
pub fn run_tick(app: &mut App, delta_secs: f32) {
    app.world.resource_mut::<EngineClock>().delta = delta_secs.max(0.0);
    app.update();
}
