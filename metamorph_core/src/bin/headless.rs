use std::path::PathBuf;

use bevy::math::Vec3;
use tracing::{info, warn};

use metamorph_core::{
    build_headless_app, run_tick, save_checkpoint, ActiveEffects, AudioEmitter, BudgetLedger,
    CreatureStats, EngineEventSender, Metamorphic, PlayerVitals, ProgressionGate, RenderState,
    TagSet, WorldPosition,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ticks: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(600);
    let checkpoint: Option<PathBuf> = std::env::args().nth(2).map(PathBuf::from);

    let mut app = build_headless_app();
    spawn_demo_world(&mut app);

    let sender = app.world.resource::<EngineEventSender>().clone();
    sender.set_local_anomaly_level("glade", 0.4);
    sender.record_symbol_discovered("sigil_of_ash");
    sender.set_weather("fog");

    info!(ticks, "headless metamorphosis run starting");
    for _ in 0..ticks {
        run_tick(&mut app, 1.0);
    }

    let active = app.world.resource::<ActiveEffects>();
    let ledger = app.world.resource::<BudgetLedger>();
    let gate = app.world.resource::<ProgressionGate>();
    info!(
        live_effects = active.len(),
        phase = gate.phase(),
        budget_available = ledger.available(),
        budget_max = ledger.max(),
        "headless run complete"
    );

    if let Some(path) = checkpoint {
        if let Err(err) = save_checkpoint(&app.world, &path) {
            warn!(error = %err, "checkpoint save failed");
        }
    }
}

fn spawn_demo_world(app: &mut bevy::app::App) {
    app.world.spawn((
        WorldPosition(Vec3::ZERO),
        TagSet::new(["player", "visible"]),
        PlayerVitals::default(),
        Metamorphic::new(0.6),
        RenderState::default(),
    ));
    app.world.spawn((
        WorldPosition(Vec3::new(12.0, 0.0, 3.0)),
        TagSet::new(["animal", "creature", "visible", "audible"]),
        CreatureStats::default(),
        RenderState::default(),
        AudioEmitter::default(),
        Metamorphic::new(0.2),
    ));
    app.world.spawn((
        WorldPosition(Vec3::new(-6.0, 0.0, 9.0)),
        TagSet::new(["plant", "tree", "visible"]),
        RenderState::default(),
        Metamorphic::new(0.1),
    ));
    app.world.spawn((
        WorldPosition(Vec3::new(2.0, 0.0, -4.0)),
        TagSet::new(["ritual_site", "visible"]),
        RenderState::default(),
        Metamorphic::new(0.9),
    ));
}
