use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bevy::math::Vec3;
use bevy::prelude::{Query, Res, ResMut, Resource};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::budget::BudgetLedger;
use crate::components::{PlayerVitals, TagSet, WorldPosition};
use crate::progression::{transformation_progress, ProgressionGate};
use crate::registry::{ActiveEffects, EffectSummary};
use crate::resources::{EngineClock, EngineConfig};

/// One recorded player action, kept in a bounded ring for trigger checks.
/// `at` is stamped with the engine clock when the action is drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub action: String,
    #[serde(default)]
    pub at: f64,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub value: f32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PlayerAction {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            at: 0.0,
            position: Vec3::ZERO,
            target: None,
            value: 0.0,
            tags: Vec::new(),
        }
    }

    pub fn at_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone)]
enum EngineEvent {
    PlayerAction(PlayerAction),
    SymbolDiscovered(String),
    RitualCompleted(String),
    PlayerDeath,
    LocalAnomaly { area: String, level: f32 },
    Weather(String),
}

/// Cloneable handle through which other subsystems (input, event handling,
/// scripting) feed the engine. Sends never block; everything is applied at
/// the start of the next tick on the simulation thread, which is the single
/// mutual-exclusion boundary around engine state.
#[derive(Resource, Debug, Clone)]
pub struct EngineEventSender {
    tx: Sender<EngineEvent>,
}

impl EngineEventSender {
    pub fn record_player_action(&self, action: PlayerAction) {
        let _ = self.tx.send(EngineEvent::PlayerAction(action));
    }

    pub fn record_symbol_discovered(&self, symbol_id: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::SymbolDiscovered(symbol_id.into()));
    }

    pub fn record_ritual_completed(&self, ritual_id: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::RitualCompleted(ritual_id.into()));
    }

    pub fn record_player_death(&self) {
        let _ = self.tx.send(EngineEvent::PlayerDeath);
    }

    pub fn set_local_anomaly_level(&self, area: impl Into<String>, level: f32) {
        let _ = self.tx.send(EngineEvent::LocalAnomaly {
            area: area.into(),
            level: level.clamp(0.0, 1.0),
        });
    }

    pub fn set_weather(&self, weather: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::Weather(weather.into()));
    }
}

/// Receiving end of the engine channel, drained once per tick.
#[derive(Resource, Debug)]
pub struct EngineInbox {
    rx: Receiver<EngineEvent>,
}

pub fn engine_channel() -> (EngineEventSender, EngineInbox) {
    let (tx, rx) = unbounded();
    (EngineEventSender { tx }, EngineInbox { rx })
}

/// Long-lived world facts accumulated from engine events. Persisted across
/// checkpoints alongside the ledger and gate.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct WorldConditions {
    pub time_of_day: f32,
    pub anomaly_level: f32,
    pub recent_actions: VecDeque<PlayerAction>,
    pub discovered_symbols: BTreeSet<String>,
    pub completed_rituals: BTreeSet<String>,
    pub local_anomaly: BTreeMap<String, f32>,
    pub weather: String,
    pub last_death_at: Option<f64>,
    pub cycles: u32,
}

impl Default for WorldConditions {
    fn default() -> Self {
        Self {
            // Runs start at dawn under a clear sky.
            time_of_day: 0.25,
            anomaly_level: 0.0,
            recent_actions: VecDeque::new(),
            discovered_symbols: BTreeSet::new(),
            completed_rituals: BTreeSet::new(),
            local_anomaly: BTreeMap::new(),
            weather: "clear".to_string(),
            last_death_at: None,
            cycles: 0,
        }
    }
}

impl WorldConditions {
    pub fn push_action(&mut self, mut action: PlayerAction, at: f64, cap: usize) {
        action.at = at;
        if self.recent_actions.len() >= cap.max(1) {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(action);
    }
}

/// Mean anomaly over all reporting areas, with each live effect contributing
/// a fifth of its intensity as one more sample.
pub(crate) fn aggregate_anomaly(
    local: &BTreeMap<String, f32>,
    active_intensities: impl Iterator<Item = f32>,
) -> f32 {
    let mut total = 0.0;
    let mut count = 0usize;
    for level in local.values() {
        total += level;
        count += 1;
    }
    for intensity in active_intensities {
        total += intensity * 0.2;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        (total / count as f32).min(1.0)
    }
}

/// Position and tags of one tagged world object, sampled for proximity
/// triggers and region matching against the player.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedLocation {
    pub position: Vec3,
    pub tags: Vec<String>,
}

/// Read-mostly facade over the world, rebuilt once per tick before trigger
/// evaluation and never mutated mid-tick.
#[derive(Resource, Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub now: f64,
    pub time_of_day: f32,
    pub player_position: Vec3,
    pub player_health: f32,
    pub player_sanity: f32,
    pub phase: u8,
    pub active_effects: BTreeMap<String, EffectSummary>,
    pub anomaly_level: f32,
    pub recent_actions: VecDeque<PlayerAction>,
    pub discovered_symbols: BTreeSet<String>,
    pub completed_rituals: BTreeSet<String>,
    pub local_anomaly: BTreeMap<String, f32>,
    pub weather: String,
    pub last_death_at: Option<f64>,
    pub cycles: u32,
    pub tagged_locations: Vec<TaggedLocation>,
}

impl WorldSnapshot {
    pub fn progress(&self) -> f32 {
        transformation_progress(
            self.discovered_symbols.len(),
            self.completed_rituals.len(),
            self.cycles,
            self.anomaly_level,
        )
    }

    pub fn has_recent_action(&self, action: &str, window_secs: f64) -> bool {
        self.recent_actions
            .iter()
            .any(|entry| entry.action == action && self.now - entry.at <= window_secs)
    }
}

pub fn drain_engine_inbox(
    config: Res<EngineConfig>,
    clock: Res<EngineClock>,
    inbox: Res<EngineInbox>,
    mut conditions: ResMut<WorldConditions>,
    mut ledger: ResMut<BudgetLedger>,
) {
    let now = clock.elapsed;
    while let Ok(event) = inbox.rx.try_recv() {
        match event {
            EngineEvent::PlayerAction(action) => {
                conditions.push_action(action, now, config.action_history_cap);
            }
            EngineEvent::SymbolDiscovered(symbol_id) => {
                if conditions.discovered_symbols.insert(symbol_id.clone()) {
                    let action =
                        PlayerAction::new("discover_symbol").with_target(symbol_id.clone());
                    conditions.push_action(action, now, config.action_history_cap);
                    info!(
                        target: "metamorph::events",
                        symbol = %symbol_id,
                        total = conditions.discovered_symbols.len(),
                        "symbol.discovered"
                    );
                }
            }
            EngineEvent::RitualCompleted(ritual_id) => {
                if conditions.completed_rituals.insert(ritual_id.clone()) {
                    let action =
                        PlayerAction::new("complete_ritual").with_target(ritual_id.clone());
                    conditions.push_action(action, now, config.action_history_cap);
                    info!(
                        target: "metamorph::events",
                        ritual = %ritual_id,
                        total = conditions.completed_rituals.len(),
                        "ritual.completed"
                    );
                }
            }
            EngineEvent::PlayerDeath => {
                conditions.cycles += 1;
                conditions.last_death_at = Some(now);
                ledger.increase_max(config.rebirth_budget_bonus);
                info!(
                    target: "metamorph::events",
                    cycles = conditions.cycles,
                    budget_max = ledger.max(),
                    "player.rebirth"
                );
            }
            EngineEvent::LocalAnomaly { area, level } => {
                conditions.local_anomaly.insert(area, level);
            }
            EngineEvent::Weather(weather) => {
                conditions.weather = weather;
            }
        }
    }
}

pub fn rebuild_world_snapshot(
    config: Res<EngineConfig>,
    clock: Res<EngineClock>,
    gate: Res<ProgressionGate>,
    active: Res<ActiveEffects>,
    mut conditions: ResMut<WorldConditions>,
    mut snapshot: ResMut<WorldSnapshot>,
    objects: Query<(&WorldPosition, &TagSet, Option<&PlayerVitals>)>,
) {
    conditions.time_of_day = (conditions.time_of_day
        + clock.delta / config.day_length_secs.max(1.0))
    .rem_euclid(1.0);
    conditions.anomaly_level = aggregate_anomaly(
        &conditions.local_anomaly,
        active.iter().map(|effect| effect.template.intensity),
    );

    let mut player_position = Vec3::ZERO;
    let mut player_health = 1.0;
    let mut player_sanity = 1.0;
    let mut tagged_locations = Vec::new();
    for (position, tags, vitals) in objects.iter() {
        if !tags.tags.is_empty() {
            tagged_locations.push(TaggedLocation {
                position: position.0,
                tags: tags.tags.clone(),
            });
        }
        if tags.contains("player") {
            player_position = position.0;
            if let Some(vitals) = vitals {
                player_health = vitals.health_fraction();
                player_sanity = vitals.sanity_fraction();
            }
        }
    }

    *snapshot = WorldSnapshot {
        now: clock.elapsed,
        time_of_day: conditions.time_of_day,
        player_position,
        player_health,
        player_sanity,
        phase: gate.phase(),
        active_effects: active.summaries(),
        anomaly_level: conditions.anomaly_level,
        recent_actions: conditions.recent_actions.clone(),
        discovered_symbols: conditions.discovered_symbols.clone(),
        completed_rituals: conditions.completed_rituals.clone(),
        local_anomaly: conditions.local_anomaly.clone(),
        weather: conditions.weather.clone(),
        last_death_at: conditions.last_death_at,
        cycles: conditions.cycles,
        tagged_locations,
    };
}
