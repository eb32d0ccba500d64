mod common;

use metamorph_core::{
    admit_from_template, effect_cost, remove_effect, run_tick, ActiveEffects, BudgetLedger,
    EffectCatalogHandle, EngineConfig, HistoryEvent, HistoryLog, Metamorphic, RenderState,
};

fn applied_count(history: &HistoryLog) -> usize {
    history
        .entries()
        .filter(|entry| matches!(entry.event, HistoryEvent::AppliedToObject { .. }))
        .count()
}

/// A matching, fully susceptible object receives a live effect exactly once;
/// further reconcile passes are no-ops.
#[test]
fn reconciliation_applies_once_and_stays_idempotent() {
    let mut app = common::isolated_app(3, common::PULSE_EFFECT);
    let object = common::spawn_soft_object(&mut app);
    let id = admit_from_template(&mut app.world, "pale_pulse")
        .unwrap()
        .expect("admission should be affordable");

    run_tick(&mut app, 1.0);

    let metamorphic = app.world.get::<Metamorphic>(object).unwrap();
    assert!(metamorphic.carries(&id));
    assert!(metamorphic.abnormality > 0.9);
    let render = app.world.get::<RenderState>(object).unwrap();
    assert!((render.distortion - 0.2).abs() < 1e-6);
    assert_eq!(applied_count(app.world.resource::<HistoryLog>()), 1);

    for _ in 0..3 {
        run_tick(&mut app, 1.0);
    }
    assert_eq!(applied_count(app.world.resource::<HistoryLog>()), 1);
    let render = app.world.get::<RenderState>(object).unwrap();
    assert!((render.distortion - 0.2).abs() < 1e-6);
}

/// Expiry removes the effect from carriers, reverses the visual changes and
/// credits half the admission cost back.
#[test]
fn expiry_reverts_carriers_and_refunds_half() {
    let mut app = common::isolated_app_with_config(
        EngineConfig {
            world_seed: 4,
            regen_per_minute: 0.0,
            ..Default::default()
        },
        common::TIMED_PULSE_EFFECT,
    );
    let object = common::spawn_soft_object(&mut app);
    admit_from_template(&mut app.world, "brief_pulse")
        .unwrap()
        .expect("admission should be affordable");
    let cost = {
        let catalog = app.world.resource::<EffectCatalogHandle>().get();
        effect_cost(catalog.template("brief_pulse").unwrap())
    };

    // 100-second duration: alive at 50 and 98 seconds, expired at 110.
    run_tick(&mut app, 50.0);
    run_tick(&mut app, 48.0);
    assert_eq!(app.world.resource::<ActiveEffects>().len(), 1);
    run_tick(&mut app, 12.0);
    run_tick(&mut app, 1.0);

    assert!(app.world.resource::<ActiveEffects>().is_empty());
    let metamorphic = app.world.get::<Metamorphic>(object).unwrap();
    assert!(metamorphic.carried.is_empty());
    let render = app.world.get::<RenderState>(object).unwrap();
    assert_eq!(render.distortion, 0.0);
    let available = app.world.resource::<BudgetLedger>().available();
    assert!((available - (100.0 - cost / 2.0)).abs() < 1e-3);
}

/// Forced removal of an 18-point admission refunds 9, leaving the ledger at
/// 91 rather than 100: permanent mutations are a one-way sink.
#[test]
fn forced_removal_refunds_half_the_cost() {
    const SINK_EFFECT: &str = r#"{
        "version": 1,
        "effects": [
            {"id": "stone_bloom", "name": "Stone Bloom", "order": 2, "category": "visual",
             "intensity": 0.6, "duration_secs": 0.0,
             "visual_effects": ["petrified_flowers"]}
        ]
    }"#;
    let mut app = common::isolated_app_with_config(
        EngineConfig {
            world_seed: 5,
            regen_per_minute: 0.0,
            ..Default::default()
        },
        SINK_EFFECT,
    );
    let object = common::spawn_soft_object(&mut app);
    let id = admit_from_template(&mut app.world, "stone_bloom")
        .unwrap()
        .expect("admission should be affordable");
    assert!((app.world.resource::<BudgetLedger>().available() - 82.0).abs() < 1e-3);

    // Intensity 0.6 means a 0.6 mutation chance per reconcile pass; give the
    // gate a generous number of rolls.
    for _ in 0..50 {
        run_tick(&mut app, 1.0);
        if app.world.get::<Metamorphic>(object).unwrap().carries(&id) {
            break;
        }
    }
    assert!(app.world.get::<Metamorphic>(object).unwrap().carries(&id));

    assert!(remove_effect(&mut app.world, &id));
    assert!((app.world.resource::<BudgetLedger>().available() - 91.0).abs() < 1e-3);
    assert!(app.world.resource::<ActiveEffects>().is_empty());
    // Carrier state is reversed at the removal site, not left for reconcile.
    let metamorphic = app.world.get::<Metamorphic>(object).unwrap();
    assert!(metamorphic.carried.is_empty());
    assert!(!remove_effect(&mut app.world, &id));
}

/// The stochastic gate never mutates a fully stable object.
#[test]
fn fully_stable_objects_never_mutate() {
    use bevy::math::Vec3;
    use metamorph_core::{TagSet, WorldPosition};

    let mut app = common::isolated_app(6, common::PULSE_EFFECT);
    let object = app
        .world
        .spawn((
            WorldPosition(Vec3::ZERO),
            TagSet::new(["visible"]),
            RenderState::default(),
            Metamorphic::new(1.0),
        ))
        .id();
    admit_from_template(&mut app.world, "pale_pulse")
        .unwrap()
        .expect("admission should be affordable");

    for _ in 0..10 {
        run_tick(&mut app, 1.0);
    }
    let metamorphic = app.world.get::<Metamorphic>(object).unwrap();
    assert!(metamorphic.carried.is_empty());
    assert_eq!(metamorphic.abnormality, 0.0);
}
