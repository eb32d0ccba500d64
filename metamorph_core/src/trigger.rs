use std::cmp::Ordering;

use bevy::prelude::{Res, ResMut, Resource};
use rand::seq::SliceRandom;
use tracing::debug;

use crate::budget::{effect_cost, BudgetLedger};
use crate::catalog::{
    Compare, EffectCatalogHandle, Order, ThresholdMetric, TriggerCatalog, TriggerKind,
    TriggerTemplate,
};
use crate::history::{HistoryEvent, HistoryLog};
use crate::progression::{transformation_progress, ProgressionGate};
use crate::registry::{admit_effect, ActiveEffects};
use crate::resources::{EngineClock, EngineRng, IdAllocator, SimulationTick};
use crate::world_state::{aggregate_anomaly, WorldConditions, WorldSnapshot};

/// How far back a player action still counts for action-keyed conditions.
const RECENT_ACTION_WINDOW_SECS: f64 = 300.0;
/// How far back deaths and ritual completions still count.
const RECENT_EVENT_WINDOW_SECS: f64 = 600.0;

/// One live candidate condition. Consumed from the pool only when it leads
/// to a successful admission.
#[derive(Debug, Clone)]
pub struct TriggerInstance {
    pub id: String,
    pub template: TriggerTemplate,
}

impl TriggerInstance {
    /// Pure predicate over the per-tick snapshot.
    pub fn satisfied(&self, snapshot: &WorldSnapshot) -> bool {
        if snapshot.phase < self.template.min_phase {
            return false;
        }
        match &self.template.kind {
            TriggerKind::TimeOfDay { target, tolerance } => {
                let mut diff = (snapshot.time_of_day - target).abs();
                if diff > 0.5 {
                    // The day is cyclic; measure across midnight.
                    diff = 1.0 - diff;
                }
                diff <= *tolerance
            }
            TriggerKind::Proximity { tag, radius } => snapshot.tagged_locations.iter().any(
                |location| {
                    location.tags.iter().any(|t| t == tag)
                        && location.position.distance(snapshot.player_position) <= *radius
                },
            ),
            TriggerKind::PlayerAction { action } => {
                snapshot.has_recent_action(action, RECENT_ACTION_WINDOW_SECS)
            }
            TriggerKind::WorldEvent { event, min_amount } => match event.as_str() {
                "player_death" => snapshot
                    .last_death_at
                    .is_some_and(|at| snapshot.now - at <= RECENT_EVENT_WINDOW_SECS),
                _ => snapshot.recent_actions.iter().any(|entry| {
                    entry.action == *event
                        && snapshot.now - entry.at <= RECENT_ACTION_WINDOW_SECS
                        && entry.value >= *min_amount
                }),
            },
            TriggerKind::Threshold {
                metric,
                value,
                compare,
            } => {
                let observed = match metric {
                    ThresholdMetric::PlayerSanity => snapshot.player_sanity,
                    ThresholdMetric::PlayerHealth => snapshot.player_health,
                    ThresholdMetric::AnomalyLevel => snapshot.anomaly_level,
                };
                match compare {
                    Compare::Greater => observed > *value,
                    Compare::Less => observed < *value,
                    Compare::Equal => (observed - value).abs() < 0.01,
                }
            }
            TriggerKind::RitualCompleted { ritual_id } => {
                snapshot.completed_rituals.contains(ritual_id)
                    && snapshot.recent_actions.iter().any(|entry| {
                        entry.action == "complete_ritual"
                            && entry.target.as_deref() == Some(ritual_id)
                            && snapshot.now - entry.at <= RECENT_EVENT_WINDOW_SECS
                    })
            }
        }
    }

    /// The mutation order this trigger aims at, derived from its declared
    /// minimum phase and priority.
    pub fn target_order(&self) -> Order {
        let template = &self.template;
        if template.min_phase >= 5 || template.priority >= 0.95 {
            Order::Fundamental
        } else if template.min_phase >= 4 || template.priority >= 0.85 {
            Order::Systemic
        } else if template.min_phase >= 3 || template.priority >= 0.75 {
            Order::Functional
        } else if template.min_phase >= 2 || template.priority >= 0.6 {
            Order::Structural
        } else {
            Order::Visual
        }
    }
}

/// Candidate conditions awaiting their moment. The vector keeps catalog
/// order, which is the stable tie-break between equal priorities.
#[derive(Resource, Debug, Clone, Default)]
pub struct TriggerPool {
    pub candidates: Vec<TriggerInstance>,
}

impl TriggerPool {
    /// One instance per catalog template, in declaration order.
    pub fn seeded(catalog: &TriggerCatalog, ids: &mut IdAllocator) -> Self {
        let candidates = catalog
            .triggers
            .iter()
            .map(|template| TriggerInstance {
                id: ids.allocate(&template.id),
                template: template.clone(),
            })
            .collect();
        Self { candidates }
    }

    pub fn push(&mut self, instance: TriggerInstance) {
        self.candidates.push(instance);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Per-tick scheduler: ranks satisfied candidates by priority and admits at
/// most one new mutation, so world change stays paced rather than bursty.
/// Candidates that are merely unaffordable stay in the pool for a later
/// tick; only a successful admission consumes its trigger.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_triggers(
    clock: Res<EngineClock>,
    tick: Res<SimulationTick>,
    snapshot: Res<WorldSnapshot>,
    conditions: Res<WorldConditions>,
    effect_catalog: Res<EffectCatalogHandle>,
    mut pool: ResMut<TriggerPool>,
    mut gate: ResMut<ProgressionGate>,
    mut ledger: ResMut<BudgetLedger>,
    mut active: ResMut<ActiveEffects>,
    mut rng: ResMut<EngineRng>,
    mut ids: ResMut<IdAllocator>,
    mut history: ResMut<HistoryLog>,
) {
    let mut satisfied: Vec<usize> = pool
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.satisfied(&snapshot))
        .map(|(index, _)| index)
        .collect();
    if satisfied.is_empty() {
        return;
    }
    satisfied.sort_by(|a, b| {
        pool.candidates[*b]
            .template
            .priority
            .partial_cmp(&pool.candidates[*a].template.priority)
            .unwrap_or(Ordering::Equal)
    });

    let catalog = effect_catalog.get();
    let progress = snapshot.progress();
    let mut admitted_index = None;

    for index in satisfied {
        let candidate = &pool.candidates[index];
        let order = candidate.target_order();
        if !gate.is_order_admissible(order, progress) {
            continue;
        }
        let templates = catalog.templates_of_order(order);
        let Some(template) = templates.choose(&mut rng.0) else {
            continue;
        };
        let cost = effect_cost(template);
        if !ledger.try_debit(cost) {
            debug!(
                target: "metamorph::triggers",
                trigger = %candidate.id,
                template = %template.id,
                cost,
                available = ledger.available(),
                "admission.deferred=insufficient_budget"
            );
            continue;
        }

        let instance = crate::catalog::EffectInstance {
            id: ids.allocate(&template.id),
            template: (*template).clone(),
            admitted_at: 0.0,
        };
        debug!(
            target: "metamorph::triggers",
            trigger = %candidate.id,
            priority = candidate.template.priority,
            effect = %instance.id,
            "trigger.fired"
        );
        admit_effect(&mut active, &mut history, instance, cost, clock.elapsed, tick.0);

        // Admission itself raises the anomaly level, which is a progress
        // signal; recheck the gate with the post-admission aggregate.
        let anomaly = aggregate_anomaly(
            &conditions.local_anomaly,
            active.iter().map(|effect| effect.template.intensity),
        );
        let progress_after = transformation_progress(
            snapshot.discovered_symbols.len(),
            snapshot.completed_rituals.len(),
            snapshot.cycles,
            anomaly,
        );
        if let Some((from, to)) = gate.maybe_advance(progress_after) {
            history.record(tick.0, clock.elapsed, HistoryEvent::PhaseChanged { from, to });
        }

        admitted_index = Some(index);
        break;
    }

    if let Some(index) = admitted_index {
        pool.candidates.remove(index);
    }
}
