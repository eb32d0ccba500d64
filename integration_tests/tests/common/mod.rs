#![allow(dead_code)]

use std::sync::Arc;

use bevy::app::App;
use bevy::math::Vec3;

use metamorph_core::{
    build_app_with_config, EffectCatalog, EffectCatalogHandle, EngineConfig, IdAllocator,
    Metamorphic, RenderState, TagSet, TriggerCatalog, TriggerPool, WorldPosition,
};

/// Single order-1 effect: full intensity so the stochastic mutation gate
/// always passes, permanent so cost is the flat 1*10*1.0*1.5 = 15.
pub const PULSE_EFFECT: &str = r#"{
    "version": 1,
    "effects": [
        {"id": "pale_pulse", "name": "Pale Pulse", "order": 1, "category": "visual",
         "intensity": 1.0, "duration_secs": 0.0,
         "object_changes": {"render.distortion": 0.2},
         "visual_effects": ["pale_shimmer"]}
    ]
}"#;

/// Same shape of effect but expiring after 100 simulated seconds.
pub const TIMED_PULSE_EFFECT: &str = r#"{
    "version": 1,
    "effects": [
        {"id": "brief_pulse", "name": "Brief Pulse", "order": 1, "category": "visual",
         "intensity": 1.0, "duration_secs": 100.0,
         "object_changes": {"render.distortion": 0.2},
         "visual_effects": ["pale_shimmer"]}
    ]
}"#;

/// Two always-satisfied conditions (cyclic time distance never exceeds 0.5)
/// with distinct priorities, both targeting order 1.
pub const RIVAL_TRIGGERS: &str = r#"{
    "version": 1,
    "triggers": [
        {"id": "low_tide", "kind": "time_of_day", "target": 0.25, "tolerance": 0.5,
         "priority": 0.5, "min_phase": 1},
        {"id": "high_tide", "kind": "time_of_day", "target": 0.25, "tolerance": 0.5,
         "priority": 0.55, "min_phase": 1}
    ]
}"#;

/// Engine app with a fixed seed, a custom effect catalog and an empty
/// trigger pool, so tests drive admission explicitly.
pub fn isolated_app(seed: u64, effects_json: &str) -> App {
    isolated_app_with_config(
        EngineConfig {
            world_seed: seed,
            ..Default::default()
        },
        effects_json,
    )
}

/// [`isolated_app`] with full control over the engine configuration, e.g. to
/// switch budget regeneration off for exact ledger arithmetic.
pub fn isolated_app_with_config(config: EngineConfig, effects_json: &str) -> App {
    let mut app = build_app_with_config(config);
    let catalog = EffectCatalog::from_json_str(effects_json).expect("test catalog should parse");
    app.world
        .resource_mut::<EffectCatalogHandle>()
        .replace(Arc::new(catalog));
    app.world.insert_resource(TriggerPool::default());
    app
}

/// Replaces the candidate pool with instances seeded from `triggers_json`.
pub fn install_triggers(app: &mut App, triggers_json: &str) {
    let catalog = TriggerCatalog::from_json_str(triggers_json).expect("test triggers should parse");
    let mut ids = *app.world.resource::<IdAllocator>();
    let pool = TriggerPool::seeded(&catalog, &mut ids);
    app.world.insert_resource(ids);
    app.world.insert_resource(pool);
}

/// A fully susceptible, renderable object at the origin.
pub fn spawn_soft_object(app: &mut App) -> bevy::prelude::Entity {
    app.world
        .spawn((
            WorldPosition(Vec3::ZERO),
            TagSet::new(["visible"]),
            RenderState::default(),
            Metamorphic::new(0.0),
        ))
        .id()
}
