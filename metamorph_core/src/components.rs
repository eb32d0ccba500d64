use bevy::math::Vec3;
use bevy::prelude::Component;

/// Free-form tag list attached to world objects; tag matching is how effect
/// templates select their targets.
#[derive(Component, Debug, Clone, Default)]
pub struct TagSet {
    pub tags: Vec<String>,
}

impl TagSet {
    pub fn new<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn contains_any(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.contains(t))
    }
}

/// World-space position of an object, queried by region matching and
/// proximity triggers.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldPosition(pub Vec3);

/// Capability marker: objects carrying this component may be mutated.
///
/// `stability` 1.0 means immune; `abnormality` accumulates as mutations land.
/// `carried` records which live effect instances currently apply, which is
/// what reconciliation keeps consistent with the registry.
#[derive(Component, Debug, Clone)]
pub struct Metamorphic {
    pub stability: f32,
    pub abnormality: f32,
    pub carried: Vec<String>,
}

impl Metamorphic {
    pub fn new(stability: f32) -> Self {
        Self {
            stability: stability.clamp(0.0, 1.0),
            abnormality: 0.0,
            carried: Vec::new(),
        }
    }

    pub fn carries(&self, effect_id: &str) -> bool {
        self.carried.iter().any(|id| id == effect_id)
    }

    /// Records a landed mutation and raises the abnormality index in
    /// proportion to intensity and susceptibility.
    pub fn record(&mut self, effect_id: &str, intensity: f32) {
        if self.carries(effect_id) {
            return;
        }
        self.carried.push(effect_id.to_string());
        self.abnormality = (self.abnormality + intensity * (1.0 - self.stability)).min(1.0);
    }

    pub fn clear(&mut self, effect_id: &str) {
        self.carried.retain(|id| id != effect_id);
    }
}

/// Render-facing state mutated by visual-category effects.
#[derive(Component, Debug, Clone)]
pub struct RenderState {
    pub distortion: f32,
    pub scale: f32,
    pub active_effects: Vec<String>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            distortion: 0.0,
            scale: 1.0,
            active_effects: Vec::new(),
        }
    }
}

/// Physics parameters mutated by physics-category effects.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct PhysicsState {
    pub gravity: f32,
    pub friction: f32,
}

impl Default for PhysicsState {
    fn default() -> Self {
        Self {
            gravity: 1.0,
            friction: 0.5,
        }
    }
}

/// Behavioral stats mutated by entity-stat effects.
#[derive(Component, Debug, Clone)]
pub struct CreatureStats {
    pub health: f32,
    pub max_health: f32,
    pub detection_range: f32,
    pub aggression: f32,
}

impl Default for CreatureStats {
    fn default() -> Self {
        Self {
            health: 100.0,
            max_health: 100.0,
            detection_range: 20.0,
            aggression: 0.2,
        }
    }
}

/// Sound cue list mutated by audio-category effects.
#[derive(Component, Debug, Clone, Default)]
pub struct AudioEmitter {
    pub cues: Vec<String>,
}

/// Player vitals sampled into the per-tick world snapshot.
#[derive(Component, Debug, Clone)]
pub struct PlayerVitals {
    pub health: f32,
    pub max_health: f32,
    /// 0-100 scale, matching how sanity is tracked by the survival layer.
    pub sanity: f32,
}

impl PlayerVitals {
    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            0.0
        } else {
            (self.health / self.max_health).clamp(0.0, 1.0)
        }
    }

    pub fn sanity_fraction(&self) -> f32 {
        (self.sanity / 100.0).clamp(0.0, 1.0)
    }
}

impl Default for PlayerVitals {
    fn default() -> Self {
        Self {
            health: 100.0,
            max_health: 100.0,
            sanity: 100.0,
        }
    }
}
