use std::{
    collections::{BTreeMap, HashSet},
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::region::Region;
use crate::resources::IdAllocator;
use crate::trigger::TriggerInstance;

pub const BUILTIN_EFFECT_TEMPLATES: &str = include_str!("data/effect_templates.json");
pub const BUILTIN_TRIGGER_TEMPLATES: &str = include_str!("data/trigger_templates.json");

/// Severity class of a mutation, from cosmetic recoloring up to rule
/// rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "u8")]
pub enum Order {
    Visual = 1,
    Structural = 2,
    Functional = 3,
    Systemic = 4,
    Fundamental = 5,
}

impl Order {
    pub const ALL: [Order; 5] = [
        Order::Visual,
        Order::Structural,
        Order::Functional,
        Order::Systemic,
        Order::Fundamental,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Order::Visual),
            2 => Some(Order::Structural),
            3 => Some(Order::Functional),
            4 => Some(Order::Systemic),
            5 => Some(Order::Fundamental),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Order {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Order::from_u8(value).ok_or_else(|| format!("mutation order {value} out of range 1-5"))
    }
}

impl From<Order> for u8 {
    fn from(value: Order) -> Self {
        value as u8
    }
}

/// Closed set of handler families. Dispatch happens through a match over this
/// enum rather than function pointers stored on templates, which keeps
/// templates serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Visual,
    Audio,
    Physics,
    EntityStat,
    /// Interpreted at area/global level by collaborators; registers no
    /// per-object handler.
    Reality,
}

/// Immutable blueprint for a mutation. Loaded once, never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct EffectTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub order: Order,
    pub category: Category,
    /// 0 = permanent; never expires by time.
    #[serde(default)]
    pub duration_secs: f32,
    pub intensity: f32,
    #[serde(default)]
    pub affected_tags: Vec<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub object_changes: BTreeMap<String, f32>,
    #[serde(default)]
    pub world_changes: BTreeMap<String, f32>,
    #[serde(default)]
    pub visual_effects: Vec<String>,
    #[serde(default)]
    pub sound_effects: Vec<String>,
    #[serde(default)]
    pub related_symbols: Vec<String>,
}

/// Live copy of a template admitted into the world. Owned exclusively by the
/// active-effect registry from admission until expiry or removal.
#[derive(Debug, Clone)]
pub struct EffectInstance {
    pub id: String,
    pub template: EffectTemplate,
    /// Engine-clock seconds at admission; stamped by the scheduler.
    pub admitted_at: f64,
}

/// Condition blueprint. The `kind` payload carries the parameters of the
/// matching predicate implemented on [`TriggerInstance`].
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerTemplate {
    pub id: String,
    #[serde(flatten)]
    pub kind: TriggerKind,
    pub priority: f32,
    #[serde(default = "default_min_phase")]
    pub min_phase: u8,
}

const fn default_min_phase() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerKind {
    TimeOfDay {
        target: f32,
        tolerance: f32,
    },
    Proximity {
        tag: String,
        radius: f32,
    },
    PlayerAction {
        action: String,
    },
    WorldEvent {
        event: String,
        #[serde(default)]
        min_amount: f32,
    },
    Threshold {
        metric: ThresholdMetric,
        value: f32,
        compare: Compare,
    },
    RitualCompleted {
        ritual_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    PlayerSanity,
    PlayerHealth,
    AnomalyLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compare {
    Greater,
    Less,
    Equal,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse template catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read template catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate template id {id}")]
    Duplicate { id: String },
    #[error("template {id} is invalid: {reason}")]
    Invalid { id: String, reason: String },
    #[error("unknown template id {id}")]
    NotFound { id: String },
}

/// Immutable library of effect templates. Declaration order is preserved and
/// breaks ties wherever catalog order matters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EffectCatalog {
    pub version: u32,
    pub effects: Vec<EffectTemplate>,
}

impl EffectCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_EFFECT_TEMPLATES)
                .expect("builtin effect catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: EffectCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn template(&self, id: &str) -> Option<&EffectTemplate> {
        self.effects.iter().find(|entry| entry.id == id)
    }

    pub fn templates_of_order(&self, order: Order) -> Vec<&EffectTemplate> {
        self.effects
            .iter()
            .filter(|entry| entry.order == order)
            .collect()
    }

    /// Builds a fresh instance of a known template with a generated id and a
    /// zeroed admission time.
    pub fn instantiate(
        &self,
        template_id: &str,
        ids: &mut IdAllocator,
    ) -> Result<EffectInstance, CatalogError> {
        let template = self.template(template_id).ok_or_else(|| CatalogError::NotFound {
            id: template_id.to_string(),
        })?;
        Ok(EffectInstance {
            id: ids.allocate(&template.id),
            template: template.clone(),
            admitted_at: 0.0,
        })
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for effect in &self.effects {
            if !seen.insert(effect.id.clone()) {
                return Err(CatalogError::Duplicate {
                    id: effect.id.clone(),
                });
            }
            if !(0.0..=1.0).contains(&effect.intensity) {
                return Err(CatalogError::Invalid {
                    id: effect.id.clone(),
                    reason: format!("intensity {} outside 0-1", effect.intensity),
                });
            }
            if let Some(region) = &effect.region {
                if region.falloff_min > region.falloff_max {
                    return Err(CatalogError::Invalid {
                        id: effect.id.clone(),
                        reason: format!(
                            "falloff_min {} exceeds falloff_max {}",
                            region.falloff_min, region.falloff_max
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Immutable library of trigger templates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TriggerCatalog {
    pub version: u32,
    pub triggers: Vec<TriggerTemplate>,
}

impl TriggerCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_TRIGGER_TEMPLATES)
                .expect("builtin trigger catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: TriggerCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn template(&self, id: &str) -> Option<&TriggerTemplate> {
        self.triggers.iter().find(|entry| entry.id == id)
    }

    pub fn instantiate(
        &self,
        template_id: &str,
        ids: &mut IdAllocator,
    ) -> Result<TriggerInstance, CatalogError> {
        let template = self.template(template_id).ok_or_else(|| CatalogError::NotFound {
            id: template_id.to_string(),
        })?;
        Ok(TriggerInstance {
            id: ids.allocate(&template.id),
            template: template.clone(),
        })
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for trigger in &self.triggers {
            if !seen.insert(trigger.id.clone()) {
                return Err(CatalogError::Duplicate {
                    id: trigger.id.clone(),
                });
            }
            if !(0.0..=1.0).contains(&trigger.priority) {
                return Err(CatalogError::Invalid {
                    id: trigger.id.clone(),
                    reason: format!("priority {} outside 0-1", trigger.priority),
                });
            }
            if !(1..=5).contains(&trigger.min_phase) {
                return Err(CatalogError::Invalid {
                    id: trigger.id.clone(),
                    reason: format!("min_phase {} outside 1-5", trigger.min_phase),
                });
            }
        }
        Ok(())
    }
}

#[derive(Resource, Debug, Clone)]
pub struct EffectCatalogHandle(Arc<EffectCatalog>);

impl EffectCatalogHandle {
    pub fn new(catalog: Arc<EffectCatalog>) -> Self {
        Self(catalog)
    }

    pub fn get(&self) -> Arc<EffectCatalog> {
        Arc::clone(&self.0)
    }

    pub fn replace(&mut self, catalog: Arc<EffectCatalog>) {
        self.0 = catalog;
    }
}

#[derive(Resource, Debug, Clone)]
pub struct TriggerCatalogHandle(Arc<TriggerCatalog>);

impl TriggerCatalogHandle {
    pub fn new(catalog: Arc<TriggerCatalog>) -> Self {
        Self(catalog)
    }

    pub fn get(&self) -> Arc<TriggerCatalog> {
        Arc::clone(&self.0)
    }

    pub fn replace(&mut self, catalog: Arc<TriggerCatalog>) {
        self.0 = catalog;
    }
}

/// Loads the effect catalog from `METAMORPH_EFFECTS_PATH` when set. An
/// absent backing file is seeded with the builtin set so the engine is
/// operable (and editable) from a cold start; any other failure falls back
/// to the builtins. Load failure is never fatal.
pub fn load_effect_catalog_from_env() -> Arc<EffectCatalog> {
    if let Ok(path) = env::var("METAMORPH_EFFECTS_PATH") {
        let path = PathBuf::from(path);
        match EffectCatalog::from_file(&path) {
            Ok(catalog) => {
                info!(
                    target: "metamorph::config",
                    path = %path.display(),
                    "effect_catalog.loaded=file"
                );
                return Arc::new(catalog);
            }
            Err(err) => {
                handle_catalog_miss(&path, BUILTIN_EFFECT_TEMPLATES, "effect_catalog", &err);
            }
        }
    }
    info!(target: "metamorph::config", "effect_catalog.loaded=builtin");
    EffectCatalog::builtin()
}

/// Loads the trigger catalog from `METAMORPH_TRIGGERS_PATH` with the same
/// seed-or-fall-back behavior as the effect catalog.
pub fn load_trigger_catalog_from_env() -> Arc<TriggerCatalog> {
    if let Ok(path) = env::var("METAMORPH_TRIGGERS_PATH") {
        let path = PathBuf::from(path);
        match TriggerCatalog::from_file(&path) {
            Ok(catalog) => {
                info!(
                    target: "metamorph::config",
                    path = %path.display(),
                    "trigger_catalog.loaded=file"
                );
                return Arc::new(catalog);
            }
            Err(err) => {
                handle_catalog_miss(&path, BUILTIN_TRIGGER_TEMPLATES, "trigger_catalog", &err);
            }
        }
    }
    info!(target: "metamorph::config", "trigger_catalog.loaded=builtin");
    TriggerCatalog::builtin()
}

/// On a missing backing file, writes the builtin set there so the store is
/// populated for the next run; other errors are only logged.
fn handle_catalog_miss(path: &Path, builtin_json: &str, label: &str, err: &CatalogError) {
    let missing = matches!(
        err,
        CatalogError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound
    );
    if missing {
        let seeded = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, builtin_json));
        match seeded {
            Ok(()) => info!(
                target: "metamorph::config",
                path = %path.display(),
                "{label}.seeded=builtin"
            ),
            Err(write_err) => warn!(
                target: "metamorph::config",
                path = %path.display(),
                error = %write_err,
                "{label}.seed_failed"
            ),
        }
    } else {
        warn!(
            target: "metamorph::config",
            path = %path.display(),
            error = %err,
            "{label}.load_failed"
        );
    }
}
