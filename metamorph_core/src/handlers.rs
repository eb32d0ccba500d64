use thiserror::Error;

use crate::catalog::{Category, EffectTemplate};
use crate::components::{AudioEmitter, CreatureStats, PhysicsState, RenderState};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("object lacks the capability expected by a {0:?} effect")]
    MissingCapability(Category),
}

const STAT_KEYS: [&str; 3] = ["health.max", "ai.detection_range", "ai.aggression"];

fn wants_render(template: &EffectTemplate) -> bool {
    !template.visual_effects.is_empty()
        || template.object_changes.contains_key("render.distortion")
        || template.object_changes.contains_key("render.scale")
}

fn wants_physics(template: &EffectTemplate) -> bool {
    template.object_changes.contains_key("physics.gravity")
        || template.object_changes.contains_key("physics.friction")
}

fn wants_stats(template: &EffectTemplate) -> bool {
    STAT_KEYS
        .iter()
        .any(|key| template.object_changes.contains_key(*key))
}

/// Applies `template`'s per-object changes to whichever capability components
/// the object carries. Errors only when the template demands a capability the
/// object lacks; the caller logs and moves on without aborting the tick.
pub(crate) fn apply_to_object(
    template: &EffectTemplate,
    render: Option<&mut RenderState>,
    physics: Option<&mut PhysicsState>,
    stats: Option<&mut CreatureStats>,
    audio: Option<&mut AudioEmitter>,
) -> Result<(), HandlerError> {
    match template.category {
        Category::Visual => {
            let Some(render) = render else {
                if wants_render(template) {
                    return Err(HandlerError::MissingCapability(Category::Visual));
                }
                return Ok(());
            };
            for effect in &template.visual_effects {
                if !render.active_effects.contains(effect) {
                    render.active_effects.push(effect.clone());
                }
            }
            if let Some(distortion) = template.object_changes.get("render.distortion") {
                render.distortion = (render.distortion + distortion).min(1.0);
            }
            if let Some(scale) = template.object_changes.get("render.scale") {
                if *scale > f32::EPSILON {
                    render.scale *= scale;
                }
            }
        }
        Category::Audio => {
            let Some(audio) = audio else {
                if template.sound_effects.is_empty() {
                    return Ok(());
                }
                return Err(HandlerError::MissingCapability(Category::Audio));
            };
            for cue in &template.sound_effects {
                if !audio.cues.contains(cue) {
                    audio.cues.push(cue.clone());
                }
            }
        }
        Category::Physics => {
            let Some(physics) = physics else {
                if wants_physics(template) {
                    return Err(HandlerError::MissingCapability(Category::Physics));
                }
                return Ok(());
            };
            if let Some(gravity) = template.object_changes.get("physics.gravity") {
                physics.gravity = *gravity;
            }
            if let Some(friction) = template.object_changes.get("physics.friction") {
                physics.friction = *friction;
            }
        }
        Category::EntityStat => {
            let Some(stats) = stats else {
                if wants_stats(template) {
                    return Err(HandlerError::MissingCapability(Category::EntityStat));
                }
                return Ok(());
            };
            if let Some(factor) = template.object_changes.get("health.max") {
                if *factor > f32::EPSILON {
                    let fraction = if stats.max_health > 0.0 {
                        stats.health / stats.max_health
                    } else {
                        1.0
                    };
                    stats.max_health *= factor;
                    stats.health = stats.max_health * fraction;
                }
            }
            if let Some(factor) = template.object_changes.get("ai.detection_range") {
                stats.detection_range *= factor;
            }
            if let Some(factor) = template.object_changes.get("ai.aggression") {
                stats.aggression = (stats.aggression * factor).min(1.0);
            }
        }
        // Reality effects are interpreted at area/global level by
        // collaborators reading `world_changes`; nothing happens per object.
        Category::Reality => {}
    }
    Ok(())
}

/// Reverses whatever [`apply_to_object`] did for this category.
pub(crate) fn remove_from_object(
    template: &EffectTemplate,
    render: Option<&mut RenderState>,
    physics: Option<&mut PhysicsState>,
    stats: Option<&mut CreatureStats>,
    audio: Option<&mut AudioEmitter>,
) -> Result<(), HandlerError> {
    match template.category {
        Category::Visual => {
            let Some(render) = render else {
                return Ok(());
            };
            render
                .active_effects
                .retain(|effect| !template.visual_effects.contains(effect));
            if let Some(distortion) = template.object_changes.get("render.distortion") {
                render.distortion = (render.distortion - distortion).max(0.0);
            }
            if let Some(scale) = template.object_changes.get("render.scale") {
                if *scale > f32::EPSILON {
                    render.scale /= scale;
                }
            }
        }
        Category::Audio => {
            let Some(audio) = audio else {
                return Ok(());
            };
            audio.cues.retain(|cue| !template.sound_effects.contains(cue));
        }
        Category::Physics => {
            let Some(physics) = physics else {
                return Ok(());
            };
            // Reset to baseline rather than inverting: overlapping physics
            // fields would otherwise fight over the restore value.
            *physics = PhysicsState::default();
        }
        Category::EntityStat => {
            let Some(stats) = stats else {
                return Ok(());
            };
            if let Some(factor) = template.object_changes.get("health.max") {
                if *factor > f32::EPSILON {
                    let fraction = if stats.max_health > 0.0 {
                        stats.health / stats.max_health
                    } else {
                        1.0
                    };
                    stats.max_health /= factor;
                    stats.health = stats.max_health * fraction;
                }
            }
            if let Some(factor) = template.object_changes.get("ai.detection_range") {
                if *factor > f32::EPSILON {
                    stats.detection_range /= factor;
                }
            }
            if let Some(factor) = template.object_changes.get("ai.aggression") {
                if *factor > f32::EPSILON {
                    stats.aggression /= factor;
                }
            }
        }
        Category::Reality => {}
    }
    Ok(())
}

/// Whether the category does any per-tick work on carriers.
pub(crate) fn has_update(category: Category) -> bool {
    matches!(category, Category::Physics)
}

/// Per-tick handler. Physics fields keep re-asserting their targets so other
/// systems that reset gravity or friction cannot silently undo a live field.
pub(crate) fn update_on_object(
    template: &EffectTemplate,
    physics: Option<&mut PhysicsState>,
) -> Result<(), HandlerError> {
    if template.category != Category::Physics {
        return Ok(());
    }
    let Some(physics) = physics else {
        if wants_physics(template) {
            return Err(HandlerError::MissingCapability(Category::Physics));
        }
        return Ok(());
    };
    if let Some(gravity) = template.object_changes.get("physics.gravity") {
        physics.gravity = *gravity;
    }
    if let Some(friction) = template.object_changes.get("physics.friction") {
        physics.friction = *friction;
    }
    Ok(())
}
