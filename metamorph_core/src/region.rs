use bevy::math::Vec3;
use serde::Deserialize;

/// Influence below this weight is treated as exclusion so negligible
/// contributions never enter per-object bookkeeping.
pub const MIN_INFLUENCE_WEIGHT: f32 = 0.05;

/// Hard boundary of an affected region.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RegionShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Cylinder { radius: f32, height: f32 },
}

/// How influence decays between `falloff_min` and `falloff_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Falloff {
    #[default]
    None,
    Linear,
    Quadratic,
    Exponential,
}

/// Spatial extent of a mutation. Weight is 1.0 out to `falloff_min` and
/// decays monotonically to 0.0 at `falloff_max` for non-`None` falloffs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Region {
    #[serde(flatten)]
    pub shape: RegionShape,
    #[serde(default)]
    pub center: Vec3,
    #[serde(default)]
    pub falloff: Falloff,
    #[serde(default)]
    pub falloff_min: f32,
    #[serde(default)]
    pub falloff_max: f32,
}

impl Region {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self {
            shape: RegionShape::Sphere { radius },
            center,
            falloff: Falloff::None,
            falloff_min: 0.0,
            falloff_max: radius,
        }
    }

    pub fn with_falloff(mut self, falloff: Falloff, min: f32, max: f32) -> Self {
        self.falloff = falloff;
        self.falloff_min = min;
        self.falloff_max = max;
        self
    }

    /// Influence weight at `point`, or `None` when the point lies outside the
    /// hard boundary or its weight falls under [`MIN_INFLUENCE_WEIGHT`].
    pub fn inclusion(&self, point: Vec3) -> Option<f32> {
        match self.shape {
            RegionShape::Sphere { radius } => {
                let distance = point.distance(self.center);
                if distance > radius {
                    return None;
                }
                self.falloff_weight(distance)
            }
            // Boxes keep a sharp edge: containment only, no falloff.
            RegionShape::Box { half_extents } => {
                let delta = (point - self.center).abs();
                if delta.x > half_extents.x || delta.y > half_extents.y || delta.z > half_extents.z
                {
                    return None;
                }
                Some(1.0)
            }
            RegionShape::Cylinder { radius, height } => {
                let dx = point.x - self.center.x;
                let dz = point.z - self.center.z;
                let horizontal = (dx * dx + dz * dz).sqrt();
                if horizontal > radius || (point.y - self.center.y).abs() > height / 2.0 {
                    return None;
                }
                self.falloff_weight(horizontal)
            }
        }
    }

    fn falloff_weight(&self, distance: f32) -> Option<f32> {
        if self.falloff == Falloff::None || distance <= self.falloff_min {
            return Some(1.0);
        }
        let span = (self.falloff_max - self.falloff_min).max(f32::EPSILON);
        let normalized = ((distance - self.falloff_min) / span).clamp(0.0, 1.0);
        let weight = match self.falloff {
            Falloff::None => 1.0,
            Falloff::Linear => 1.0 - normalized,
            Falloff::Quadratic => 1.0 - normalized * normalized,
            Falloff::Exponential => (-3.0 * normalized).exp(),
        };
        if weight < MIN_INFLUENCE_WEIGHT {
            None
        } else {
            Some(weight)
        }
    }
}
