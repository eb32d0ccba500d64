use std::collections::BTreeMap;

use bevy::math::Vec3;
use bevy::prelude::{Entity, Query, Res, ResMut, Resource, World};
use rand::Rng;
use tracing::{debug, info};

use crate::budget::{effect_cost, BudgetLedger, REMOVAL_REFUND_RATIO};
use crate::catalog::{EffectInstance, Order};
use crate::components::{
    AudioEmitter, CreatureStats, Metamorphic, PhysicsState, RenderState, TagSet, WorldPosition,
};
use crate::handlers;
use crate::history::{HistoryEvent, HistoryLog};
use crate::resources::{EngineClock, EngineRng, SimulationTick};

/// Order and intensity of one live effect, exposed through the world
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSummary {
    pub order: Order,
    pub intensity: f32,
}

/// Owner of all currently-applied mutations, keyed by instance id. Iteration
/// order is the id order, which keeps reconciliation deterministic.
#[derive(Resource, Debug, Clone, Default)]
pub struct ActiveEffects {
    effects: BTreeMap<String, EffectInstance>,
}

impl ActiveEffects {
    pub fn get(&self, id: &str) -> Option<&EffectInstance> {
        self.effects.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectInstance> {
        self.effects.values()
    }

    pub fn by_order(&self, order: Order) -> Vec<&EffectInstance> {
        self.effects
            .values()
            .filter(|instance| instance.template.order == order)
            .collect()
    }

    pub fn summaries(&self) -> BTreeMap<String, EffectSummary> {
        self.effects
            .iter()
            .map(|(id, instance)| {
                (
                    id.clone(),
                    EffectSummary {
                        order: instance.template.order,
                        intensity: instance.template.intensity,
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub(crate) fn insert(&mut self, instance: EffectInstance) {
        debug_assert!(
            !self.effects.contains_key(&instance.id),
            "live instance id collision: {}",
            instance.id
        );
        self.effects.insert(instance.id.clone(), instance);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<EffectInstance> {
        self.effects.remove(id)
    }
}

/// Whether `instance` selects an object with the given tags and position:
/// the tag filter must overlap (or be empty) and the region, when present,
/// must yield a non-excluded weight.
pub fn object_matches(instance: &EffectInstance, tags: &TagSet, position: Vec3) -> bool {
    let template = &instance.template;
    if !template.affected_tags.is_empty() && !tags.contains_any(&template.affected_tags) {
        return false;
    }
    match &template.region {
        Some(region) => region.inclusion(position).is_some(),
        None => true,
    }
}

pub(crate) type ObjectQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static TagSet,
        &'static WorldPosition,
        &'static mut Metamorphic,
        Option<&'static mut RenderState>,
        Option<&'static mut PhysicsState>,
        Option<&'static mut CreatureStats>,
        Option<&'static mut AudioEmitter>,
    ),
>;

/// Stamps and inserts a freshly funded instance. The caller has already
/// debited the ledger; per-object application happens in the reconcile pass
/// later this same tick.
pub(crate) fn admit_effect(
    active: &mut ActiveEffects,
    history: &mut HistoryLog,
    mut instance: EffectInstance,
    cost: f32,
    now: f64,
    tick: u64,
) {
    instance.admitted_at = now;
    info!(
        target: "metamorph::registry",
        effect = %instance.id,
        template = %instance.template.id,
        order = u8::from(instance.template.order),
        cost,
        "effect.admitted"
    );
    history.record(
        tick,
        now,
        HistoryEvent::Admitted {
            effect: instance.id.clone(),
            cost,
        },
    );
    active.insert(instance);
}

/// Expires timed-out instances and runs per-tick category handlers on the
/// survivors' carriers.
pub fn update_active_effects(
    clock: Res<EngineClock>,
    tick: Res<SimulationTick>,
    mut active: ResMut<ActiveEffects>,
    mut ledger: ResMut<BudgetLedger>,
    mut history: ResMut<HistoryLog>,
    mut objects: ObjectQuery,
) {
    let now = clock.elapsed;
    let expired: Vec<String> = active
        .iter()
        .filter(|instance| {
            instance.template.duration_secs > 0.0
                && now - instance.admitted_at >= f64::from(instance.template.duration_secs)
        })
        .map(|instance| instance.id.clone())
        .collect();

    for id in expired {
        let Some(instance) = active.remove(&id) else {
            continue;
        };
        for (entity, _tags, _position, mut metamorphic, mut render, mut physics, mut stats, mut audio) in
            objects.iter_mut()
        {
            if !metamorphic.carries(&id) {
                continue;
            }
            metamorphic.clear(&id);
            if let Err(err) = handlers::remove_from_object(
                &instance.template,
                render.as_mut().map(|r| &mut **r),
                physics.as_mut().map(|p| &mut **p),
                stats.as_mut().map(|s| &mut **s),
                audio.as_mut().map(|a| &mut **a),
            ) {
                debug!(
                    target: "metamorph::registry",
                    effect = %id,
                    object = entity.to_bits(),
                    error = %err,
                    "remove_handler.skipped"
                );
            }
            history.record(
                tick.0,
                now,
                HistoryEvent::RemovedFromObject {
                    effect: id.clone(),
                    object: entity.to_bits(),
                },
            );
        }
        let refund = effect_cost(&instance.template) * REMOVAL_REFUND_RATIO;
        ledger.credit(refund);
        info!(
            target: "metamorph::registry",
            effect = %id,
            refund,
            "effect.expired"
        );
        history.record(tick.0, now, HistoryEvent::Expired { effect: id, refund });
    }

    let updating: Vec<EffectInstance> = active
        .iter()
        .filter(|instance| handlers::has_update(instance.template.category))
        .cloned()
        .collect();
    for instance in &updating {
        for (entity, _tags, _position, metamorphic, _render, mut physics, _stats, _audio) in
            objects.iter_mut()
        {
            if !metamorphic.carries(&instance.id) {
                continue;
            }
            if let Err(err) = handlers::update_on_object(
                &instance.template,
                physics.as_mut().map(|p| &mut **p),
            ) {
                debug!(
                    target: "metamorph::registry",
                    effect = %instance.id,
                    object = entity.to_bits(),
                    error = %err,
                    "update_handler.skipped"
                );
            }
        }
    }
}

/// Two-directional reconciliation: newly-matching objects roll the
/// stochastic mutation gate and receive live effects; ids recorded on an
/// object but no longer live are dropped. This keeps object-local state
/// eventually consistent with the registry without every instance having to
/// enumerate every object each tick.
pub fn reconcile_objects(
    clock: Res<EngineClock>,
    tick: Res<SimulationTick>,
    active: Res<ActiveEffects>,
    mut rng: ResMut<EngineRng>,
    mut history: ResMut<HistoryLog>,
    mut objects: ObjectQuery,
) {
    let now = clock.elapsed;
    for (entity, tags, position, mut metamorphic, mut render, mut physics, mut stats, mut audio) in
        objects.iter_mut()
    {
        if metamorphic.stability < 1.0 {
            for instance in active.iter() {
                if metamorphic.carries(&instance.id) {
                    continue;
                }
                if !object_matches(instance, tags, position.0) {
                    continue;
                }
                let chance = instance.template.intensity * (1.0 - metamorphic.stability);
                if rng.0.gen::<f32>() >= chance {
                    continue;
                }
                metamorphic.record(&instance.id, instance.template.intensity);
                if let Some(delta) = instance.template.object_changes.get("metamorphic.stability")
                {
                    metamorphic.stability = (metamorphic.stability + delta).clamp(0.0, 1.0);
                }
                if let Err(err) = handlers::apply_to_object(
                    &instance.template,
                    render.as_mut().map(|r| &mut **r),
                    physics.as_mut().map(|p| &mut **p),
                    stats.as_mut().map(|s| &mut **s),
                    audio.as_mut().map(|a| &mut **a),
                ) {
                    debug!(
                        target: "metamorph::registry",
                        effect = %instance.id,
                        object = entity.to_bits(),
                        error = %err,
                        "apply_handler.skipped"
                    );
                }
                history.record(
                    tick.0,
                    now,
                    HistoryEvent::AppliedToObject {
                        effect: instance.id.clone(),
                        object: entity.to_bits(),
                    },
                );
            }
        }

        let stale: Vec<String> = metamorphic
            .carried
            .iter()
            .filter(|id| active.get(id.as_str()).is_none())
            .cloned()
            .collect();
        for id in stale {
            metamorphic.clear(&id);
            history.record(
                tick.0,
                now,
                HistoryEvent::RemovedFromObject {
                    effect: id,
                    object: entity.to_bits(),
                },
            );
        }
    }
}

/// Admits a fresh instance of `template_id` outside the trigger path, e.g.
/// for scripted sequences. Returns the new instance id, or `None` when the
/// ledger cannot cover the cost; per-object application happens on the next
/// reconcile pass.
pub fn admit_from_template(
    world: &mut World,
    template_id: &str,
) -> Result<Option<String>, crate::catalog::CatalogError> {
    let catalog = world.resource::<crate::catalog::EffectCatalogHandle>().get();
    let instance = {
        let mut ids = world.resource_mut::<crate::resources::IdAllocator>();
        catalog.instantiate(template_id, &mut *ids)?
    };
    let cost = effect_cost(&instance.template);
    if !world.resource_mut::<BudgetLedger>().try_debit(cost) {
        debug!(
            target: "metamorph::registry",
            template = %template_id,
            cost,
            "admission.rejected=insufficient_budget"
        );
        return Ok(None);
    }
    let now = world.resource::<EngineClock>().elapsed;
    let tick = world.resource::<SimulationTick>().0;
    let id = instance.id.clone();
    world.resource_scope(|world, mut active: bevy::prelude::Mut<ActiveEffects>| {
        let mut history = world.resource_mut::<HistoryLog>();
        admit_effect(&mut active, &mut history, instance, cost, now, tick);
    });
    Ok(Some(id))
}

/// Forcibly removes a live effect: reversal handlers fire on every carrier
/// and half the admission cost is credited back. Returns `false` for an
/// unknown id.
pub fn remove_effect(world: &mut World, effect_id: &str) -> bool {
    let Some(instance) = world.resource_mut::<ActiveEffects>().remove(effect_id) else {
        return false;
    };
    let now = world.resource::<EngineClock>().elapsed;
    let tick = world.resource::<SimulationTick>().0;

    let mut cleaned = Vec::new();
    let mut query = world.query::<(
        Entity,
        &mut Metamorphic,
        Option<&mut RenderState>,
        Option<&mut PhysicsState>,
        Option<&mut CreatureStats>,
        Option<&mut AudioEmitter>,
    )>();
    for (entity, mut metamorphic, mut render, mut physics, mut stats, mut audio) in
        query.iter_mut(world)
    {
        if !metamorphic.carries(effect_id) {
            continue;
        }
        metamorphic.clear(effect_id);
        if let Err(err) = handlers::remove_from_object(
            &instance.template,
            render.as_mut().map(|r| &mut **r),
            physics.as_mut().map(|p| &mut **p),
            stats.as_mut().map(|s| &mut **s),
            audio.as_mut().map(|a| &mut **a),
        ) {
            debug!(
                target: "metamorph::registry",
                effect = %effect_id,
                object = entity.to_bits(),
                error = %err,
                "remove_handler.skipped"
            );
        }
        cleaned.push(entity);
    }

    let refund = effect_cost(&instance.template) * REMOVAL_REFUND_RATIO;
    world.resource_mut::<BudgetLedger>().credit(refund);
    let mut history = world.resource_mut::<HistoryLog>();
    for entity in cleaned {
        history.record(
            tick,
            now,
            HistoryEvent::RemovedFromObject {
                effect: effect_id.to_string(),
                object: entity.to_bits(),
            },
        );
    }
    history.record(
        tick,
        now,
        HistoryEvent::Removed {
            effect: effect_id.to_string(),
            refund,
        },
    );
    info!(
        target: "metamorph::registry",
        effect = %effect_id,
        refund,
        "effect.removed"
    );
    true
}
