//! Entity model.
//!
//! An [`Entity`] is a set of shared spatial fields plus exactly one
//! kind-specific extension ([`EntityKind`]). Stat validation lives on the
//! extension types, so callers never branch on a kind string.

use std::collections::BTreeMap;

use serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::math::{Rgba, Vec3};

/// Kind-agnostic annotations attached to an entity.
pub type Meta = Map<String, Value>;

/// A uniquely identified simulated object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub color: Rgba,
    #[serde(default)]
    pub meta: Meta,
    #[serde(flatten)]
    pub kind: EntityKind,
}

impl Entity {
    /// Creates an entity of `kind` with default transform and color.
    pub fn new(entity_id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            entity_id: entity_id.into(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            color: Rgba::WHITE,
            meta: Meta::new(),
            kind,
        }
    }
}

/// Kind-specific extension, serialized under the `type` key.
///
/// Type names without dedicated behavior are kept verbatim in
/// [`EntityKind::Generic`] so clients get back the name they sent.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Cube,
    Player(PlayerExt),
    Pet(PetExt),
    Generic(String),
}

impl EntityKind {
    /// Builds the default extension for a wire type name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "cube" => EntityKind::Cube,
            "player" => EntityKind::Player(PlayerExt::default()),
            "pet" => EntityKind::Pet(PetExt::default()),
            other => EntityKind::Generic(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityKind::Cube => "cube",
            EntityKind::Player(_) => "player",
            EntityKind::Pet(_) => "pet",
            EntityKind::Generic(name) => name,
        }
    }
}

/// Wire shape of the kinds with dedicated behavior.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownKind<'a> {
    Cube,
    Player(&'a PlayerExt),
    Pet(&'a PetExt),
}

impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EntityKind::Cube => KnownKind::Cube.serialize(serializer),
            EntityKind::Player(ext) => KnownKind::Player(ext).serialize(serializer),
            EntityKind::Pet(ext) => KnownKind::Pet(ext).serialize(serializer),
            EntityKind::Generic(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", name)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let name = match fields.remove("type") {
            Some(Value::String(name)) => name,
            Some(_) => return Err(de::Error::custom("entity 'type' must be a string")),
            None => return Err(de::Error::missing_field("type")),
        };
        let rest = Value::Object(fields);
        match name.as_str() {
            "cube" => Ok(EntityKind::Cube),
            "player" => serde_json::from_value(rest)
                .map(EntityKind::Player)
                .map_err(de::Error::custom),
            "pet" => serde_json::from_value(rest)
                .map(EntityKind::Pet)
                .map_err(de::Error::custom),
            _ => Ok(EntityKind::Generic(name)),
        }
    }
}

impl Default for EntityKind {
    fn default() -> Self {
        EntityKind::Cube
    }
}

/// A single stat key rejected during a stat update.
///
/// Skips are reported, never fatal to the surrounding update.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationSkip {
    #[error("stat '{key}' is not numeric")]
    NotNumeric { key: String },
    #[error("stat '{key}' may not be negative (got {value})")]
    Negative { key: String, value: f64 },
    #[error("level must be at least 1 (got {value})")]
    LevelBelowOne { value: f64 },
}

impl ValidationSkip {
    pub fn key(&self) -> &str {
        match self {
            ValidationSkip::NotNumeric { key } | ValidationSkip::Negative { key, .. } => key,
            ValidationSkip::LevelBelowOne { .. } => "level",
        }
    }
}

fn numeric(key: &str, value: &Value) -> Result<f64, ValidationSkip> {
    value.as_f64().ok_or_else(|| ValidationSkip::NotNumeric {
        key: key.to_string(),
    })
}

fn non_negative(key: &str, value: f64) -> Result<f64, ValidationSkip> {
    if value < 0.0 {
        Err(ValidationSkip::Negative {
            key: key.to_string(),
            value,
        })
    } else {
        Ok(value)
    }
}

/// Player stats. Health, stamina and mana stay >= 0; level stays >= 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub health: f64,
    pub stamina: f64,
    pub mana: f64,
    pub level: f64,
    pub experience: f64,
    /// Additional numeric stats set through updates.
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            health: 100.0,
            stamina: 100.0,
            mana: 100.0,
            level: 1.0,
            experience: 0.0,
            extra: BTreeMap::new(),
        }
    }
}

impl PlayerStats {
    /// Assigns one stat, or reports why it was skipped.
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<(), ValidationSkip> {
        let v = numeric(key, value)?;
        match key {
            "health" => self.health = non_negative(key, v)?,
            "stamina" => self.stamina = non_negative(key, v)?,
            "mana" => self.mana = non_negative(key, v)?,
            "level" => {
                if v < 1.0 {
                    return Err(ValidationSkip::LevelBelowOne { value: v });
                }
                self.level = v;
            }
            "experience" => self.experience = v,
            other => {
                self.extra.insert(other.to_string(), v);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub speed: f64,
    pub jump_strength: f64,
}

impl Default for Movement {
    fn default() -> Self {
        Self {
            speed: 5.0,
            jump_strength: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerExt {
    pub stats: PlayerStats,
    pub movement: Movement,
    pub inventory: Vec<Value>,
}

/// Pet stats. Health stays >= 0; loyalty is clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetStats {
    pub health: f64,
    pub loyalty: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl Default for PetStats {
    fn default() -> Self {
        Self {
            health: 50.0,
            loyalty: 50.0,
            extra: BTreeMap::new(),
        }
    }
}

impl PetStats {
    pub const LOYALTY_MAX: f64 = 100.0;

    /// Assigns one stat, or reports why it was skipped.
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<(), ValidationSkip> {
        let v = numeric(key, value)?;
        match key {
            "health" => self.health = non_negative(key, v)?,
            "loyalty" => self.loyalty = v.clamp(0.0, Self::LOYALTY_MAX),
            other => {
                self.extra.insert(other.to_string(), v);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    #[default]
    Follow,
    Stay,
    Wander,
}

/// Pet behavior. `target_id` names another entity without owning it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub mode: BehaviorMode,
    #[serde(default)]
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PetExt {
    pub stats: PetStats,
    pub behavior: Behavior,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_roundtrip_through_from_name() {
        for name in ["cube", "player", "pet"] {
            assert_eq!(EntityKind::from_name(name).name(), name);
        }
        assert_eq!(
            EntityKind::from_name("lamp"),
            EntityKind::Generic("lamp".into())
        );
        assert_eq!(EntityKind::from_name("lamp").name(), "lamp");
    }

    #[test]
    fn player_serializes_flat_with_type_tag() {
        let e = Entity::new("p1", EntityKind::from_name("player"));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "player");
        assert_eq!(v["entity_id"], "p1");
        assert_eq!(v["stats"]["level"], 1.0);
        assert_eq!(v["movement"]["speed"], 5.0);
        assert_eq!(v["scale"], json!([1.0, 1.0, 1.0]));
        let back: Entity = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn unknown_type_is_kept_verbatim() {
        let v = json!({
            "entity_id": "x",
            "type": "lamp",
            "position": [0, 0, 0],
            "rotation": [0, 0, 0],
            "scale": [1, 1, 1],
            "color": [1, 1, 1, 1],
        });
        let e: Entity = serde_json::from_value(v).unwrap();
        assert_eq!(e.kind, EntityKind::Generic("lamp".into()));
        let back = serde_json::to_value(&e).unwrap();
        assert_eq!(back["type"], "lamp");
        assert_eq!(serde_json::from_value::<Entity>(back).unwrap(), e);
    }

    #[test]
    fn entity_without_type_is_rejected() {
        let v = json!({
            "entity_id": "x",
            "position": [0, 0, 0],
            "rotation": [0, 0, 0],
            "scale": [1, 1, 1],
            "color": [1, 1, 1, 1],
        });
        assert!(serde_json::from_value::<Entity>(v).is_err());
    }

    #[test]
    fn player_stat_rules() {
        let mut s = PlayerStats::default();
        assert!(s.apply("health", &json!(-1)).is_err());
        assert!(s.apply("mana", &json!("lots")).is_err());
        assert_eq!(
            s.apply("level", &json!(0)),
            Err(ValidationSkip::LevelBelowOne { value: 0.0 })
        );
        s.apply("level", &json!(3)).unwrap();
        s.apply("strength", &json!(7.5)).unwrap();
        assert_eq!(s.health, 100.0);
        assert_eq!(s.level, 3.0);
        assert_eq!(s.extra.get("strength"), Some(&7.5));
    }

    #[test]
    fn skips_name_the_rejected_stat() {
        let mut s = PlayerStats::default();
        let delta = [
            ("stamina", json!(-2)),
            ("level", json!(0.5)),
            ("mana", json!(null)),
        ];
        let skips: Vec<ValidationSkip> = delta
            .iter()
            .filter_map(|(k, v)| s.apply(k, v).err())
            .collect();
        let keys: Vec<&str> = skips.iter().map(ValidationSkip::key).collect();
        assert_eq!(keys, ["stamina", "level", "mana"]);
    }

    #[test]
    fn pet_loyalty_is_clamped() {
        let mut s = PetStats::default();
        s.apply("loyalty", &json!(250)).unwrap();
        assert_eq!(s.loyalty, 100.0);
        s.apply("loyalty", &json!(-4)).unwrap();
        assert_eq!(s.loyalty, 0.0);
        assert!(s.apply("health", &json!(-0.5)).is_err());
    }
}
