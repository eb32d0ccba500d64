mod common;

use metamorph_core::{run_tick, ActiveEffects, BudgetLedger, TriggerPool};

/// Two rival conditions fire in the same tick; the higher priority wins, at
/// most one mutation is admitted, and only the winner leaves the pool.
#[test]
fn higher_priority_trigger_wins_and_only_one_admission_per_tick() {
    let mut app = common::isolated_app(17, common::PULSE_EFFECT);
    common::install_triggers(&mut app, common::RIVAL_TRIGGERS);

    run_tick(&mut app, 1.0);

    assert_eq!(app.world.resource::<ActiveEffects>().len(), 1);
    let pool = app.world.resource::<TriggerPool>();
    assert_eq!(pool.len(), 1);
    assert!(
        pool.candidates[0].id.starts_with("low_tide"),
        "the lower-priority trigger should remain, found {}",
        pool.candidates[0].id
    );
    assert!((app.world.resource::<BudgetLedger>().available() - 85.0).abs() < 1e-3);

    // The survivor is admitted on the following tick.
    run_tick(&mut app, 1.0);
    assert_eq!(app.world.resource::<ActiveEffects>().len(), 2);
    assert!(app.world.resource::<TriggerPool>().is_empty());
}

/// An admissible but unaffordable candidate stays in the pool and is
/// admitted once the ledger can cover it.
#[test]
fn unaffordable_triggers_are_retained_for_later_ticks() {
    let mut app = common::isolated_app(18, common::PULSE_EFFECT);
    common::install_triggers(&mut app, common::RIVAL_TRIGGERS);
    app.world.insert_resource(BudgetLedger::new(5.0, 5.0, 0.0));

    for _ in 0..3 {
        run_tick(&mut app, 1.0);
    }
    assert!(app.world.resource::<ActiveEffects>().is_empty());
    assert_eq!(app.world.resource::<TriggerPool>().len(), 2);
    assert_eq!(app.world.resource::<BudgetLedger>().available(), 5.0);

    app.world.insert_resource(BudgetLedger::new(100.0, 100.0, 0.0));
    run_tick(&mut app, 1.0);
    assert_eq!(app.world.resource::<ActiveEffects>().len(), 1);
    assert_eq!(app.world.resource::<TriggerPool>().len(), 1);
}
