//! Entity store.
//!
//! The [`World`] owns the canonical id -> entity mapping plus the simulated
//! clock and frame counter. Every mutating operation returns an explicit
//! outcome; nothing in here logs-and-forgets.
//!
//! Determinism notes:
//! - Entities are kept in a `BTreeMap`, so snapshots serialize in id order.
//! - The pet follow step does not depend on `dt`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    entity::{Behavior, BehaviorMode, Entity, EntityKind, Meta, Movement, ValidationSkip},
    math::{Rgba, Vec3},
};

/// Angular rate of passive cube rotation around the vertical axis (rad/s).
pub const CUBE_SPIN_RATE: f32 = 0.5;
/// Pets in follow mode stop approaching at this distance from their target.
pub const FOLLOW_RADIUS: f32 = 2.0;
/// Fraction of the excess distance a following pet closes per tick.
pub const FOLLOW_STEP: f32 = 0.1;

/// Store operation failures. Both variants are "not found"-class: the
/// command pipeline turns them into "no event".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("entity '{id}' not found")]
    NotFound { id: String },
    #[error("entity '{id}' of kind {kind} has no stats")]
    StatsUnsupported { id: String, kind: String },
}

/// Result of a stat update: the entity after the update and every key that
/// was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsUpdate {
    pub entity: Entity,
    pub skipped: Vec<ValidationSkip>,
}

/// Optional fields supplied to [`World::spawn`]. Anything left `None` takes
/// the default for the entity's kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpawnFields {
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub rotation: Option<Vec3>,
    #[serde(default)]
    pub scale: Option<Vec3>,
    #[serde(default)]
    pub color: Option<Rgba>,
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub stats: Option<Map<String, Value>>,
    #[serde(default)]
    pub movement: Option<Movement>,
    #[serde(default)]
    pub inventory: Option<Vec<Value>>,
    #[serde(default)]
    pub behavior: Option<Behavior>,
}

impl SpawnFields {
    /// Parses spawn fields from a command parameter object. Unrelated keys
    /// (such as `entity_id`) are ignored.
    pub fn from_params(params: &Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(params.clone()))
    }

    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Default::default()
        }
    }
}

/// Full copy of the world at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub time: f64,
    pub frame_count: u64,
    pub entities: BTreeMap<String, Entity>,
}

/// The authoritative entity store.
#[derive(Debug, Default)]
pub struct World {
    entities: BTreeMap<String, Entity>,
    time: f64,
    frame_count: u64,
}

impl World {
    /// Creates a world holding the default red cube `cube_0`.
    pub fn seeded() -> Self {
        let mut world = Self::default();
        let fields = SpawnFields {
            color: Some(Rgba::RED),
            ..SpawnFields::of_kind("cube")
        };
        world.spawn("cube_0", fields);
        world
    }

    /// Inserts an entity built from `fields`, replacing any entity with the
    /// same id wholesale.
    pub fn spawn(&mut self, id: &str, fields: SpawnFields) -> Entity {
        let kind = fields
            .kind
            .as_deref()
            .map(EntityKind::from_name)
            .unwrap_or_default();
        let mut entity = Entity::new(id, kind);

        if let Some(p) = fields.position {
            entity.position = p;
        }
        if let Some(r) = fields.rotation {
            entity.rotation = r;
        }
        if let Some(s) = fields.scale {
            entity.scale = s;
        }
        if let Some(c) = fields.color {
            entity.color = c;
        }
        if let Some(meta) = fields.meta {
            entity.meta = meta;
        }

        match &mut entity.kind {
            EntityKind::Player(ext) => {
                if let Some(m) = fields.movement {
                    ext.movement = m;
                }
                if let Some(inv) = fields.inventory {
                    ext.inventory = inv;
                }
            }
            EntityKind::Pet(ext) => {
                if let Some(b) = fields.behavior {
                    ext.behavior = b;
                }
            }
            EntityKind::Cube | EntityKind::Generic(_) => {}
        }
        if let Some(stats) = &fields.stats {
            for skip in apply_stats(&mut entity, stats) {
                warn!(entity_id = %id, %skip, "Spawn stat override skipped");
            }
        }

        if self.entities.insert(id.to_string(), entity.clone()).is_some() {
            info!(entity_id = %id, kind = entity.kind.name(), "Respawned entity (overwrite)");
        } else {
            info!(entity_id = %id, kind = entity.kind.name(), "Spawned entity");
        }
        entity
    }

    /// Replaces an entity's position.
    pub fn move_entity(&mut self, id: &str, position: Vec3) -> Result<Entity, StoreError> {
        let entity = self.entry(id)?;
        entity.position = position;
        debug!(entity_id = %id, ?position, "Moved entity");
        Ok(entity.clone())
    }

    /// Replaces an entity's color.
    pub fn recolor(&mut self, id: &str, color: Rgba) -> Result<Entity, StoreError> {
        let entity = self.entry(id)?;
        entity.color = color;
        debug!(entity_id = %id, ?color, "Recolored entity");
        Ok(entity.clone())
    }

    /// Applies a stat update key by key.
    ///
    /// Invalid keys are skipped and reported in [`StatsUpdate::skipped`];
    /// the remaining keys still apply.
    pub fn update_stats(
        &mut self,
        id: &str,
        delta: &Map<String, Value>,
    ) -> Result<StatsUpdate, StoreError> {
        let entity = self.entry(id)?;
        if !matches!(entity.kind, EntityKind::Player(_) | EntityKind::Pet(_)) {
            return Err(StoreError::StatsUnsupported {
                id: id.to_string(),
                kind: entity.kind.name().to_string(),
            });
        }

        let skipped = apply_stats(entity, delta);
        for skip in &skipped {
            warn!(entity_id = %id, %skip, "Stat update skipped");
        }
        Ok(StatsUpdate {
            entity: entity.clone(),
            skipped,
        })
    }

    /// Removes an entity. Returns `false` if it was already absent.
    pub fn delete(&mut self, id: &str) -> bool {
        let removed = self.entities.remove(id).is_some();
        if removed {
            info!(entity_id = %id, "Deleted entity");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Returns a copy of every entity, in id order.
    pub fn list(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            time: self.time,
            frame_count: self.frame_count,
            entities: self.entities.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advances the simulated clock by `dt` seconds and runs passive updates.
    pub fn tick(&mut self, dt: f32) {
        self.time += f64::from(dt);
        self.frame_count += 1;

        // Resolve follow targets before mutating anything.
        let mut moves = Vec::new();
        for (id, entity) in &self.entities {
            let EntityKind::Pet(pet) = &entity.kind else {
                continue;
            };
            if pet.behavior.mode != BehaviorMode::Follow {
                continue;
            }
            let Some(target_id) = pet.behavior.target_id.as_deref() else {
                continue;
            };
            if target_id == id {
                continue;
            }
            let Some(target) = self.entities.get(target_id) else {
                continue;
            };
            if let Some(next) = follow_step(entity.position, target.position) {
                moves.push((id.clone(), next));
            }
        }

        for entity in self.entities.values_mut() {
            if entity.kind == EntityKind::Cube {
                entity.rotation.y += dt * CUBE_SPIN_RATE;
            }
        }
        for (id, next) in moves {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.position = next;
            }
        }
    }

    fn entry(&mut self, id: &str) -> Result<&mut Entity, StoreError> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }
}

fn apply_stats(entity: &mut Entity, delta: &Map<String, Value>) -> Vec<ValidationSkip> {
    let mut skipped = Vec::new();
    for (key, value) in delta {
        let res = match &mut entity.kind {
            EntityKind::Player(ext) => ext.stats.apply(key, value),
            EntityKind::Pet(ext) => ext.stats.apply(key, value),
            EntityKind::Cube | EntityKind::Generic(_) => return skipped,
        };
        if let Err(skip) = res {
            skipped.push(skip);
        }
    }
    skipped
}

/// Next position of a pet approaching `target`, or `None` when it is
/// already inside the follow radius.
fn follow_step(from: Vec3, target: Vec3) -> Option<Vec3> {
    let offset = target - from;
    let dist = offset.len();
    if dist <= FOLLOW_RADIUS {
        return None;
    }
    Some(from + offset * ((dist - FOLLOW_RADIUS) * FOLLOW_STEP / dist))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PetExt;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn pet_following(world: &mut World, id: &str, at: Vec3, target: &str) {
        world.spawn(
            id,
            SpawnFields {
                position: Some(at),
                behavior: Some(Behavior {
                    mode: BehaviorMode::Follow,
                    target_id: Some(target.to_string()),
                }),
                ..SpawnFields::of_kind("pet")
            },
        );
    }

    #[test]
    fn spawn_keeps_unknown_kind_name() {
        let mut world = World::default();
        world.spawn("l", SpawnFields::of_kind("lamp"));
        let snap = serde_json::to_value(world.snapshot()).unwrap();
        assert_eq!(snap["entities"]["l"]["type"], "lamp");
        assert_eq!(
            world.update_stats("l", &obj(json!({"health": 1}))),
            Err(StoreError::StatsUnsupported {
                id: "l".into(),
                kind: "lamp".into()
            })
        );
    }

    #[test]
    fn spawn_applies_defaults() {
        let mut world = World::default();
        let e = world.spawn("c", SpawnFields::default());
        assert_eq!(e.kind, EntityKind::Cube);
        assert_eq!(e.position, Vec3::ZERO);
        assert_eq!(e.rotation, Vec3::ZERO);
        assert_eq!(e.scale, Vec3::ONE);
        assert_eq!(e.color, Rgba::WHITE);
    }

    #[test]
    fn spawn_same_id_overwrites_without_merge() {
        let mut world = World::default();
        world.spawn(
            "a",
            SpawnFields {
                color: Some(Rgba::RED),
                meta: Some(obj(json!({"tag": "first"}))),
                ..SpawnFields::of_kind("cube")
            },
        );
        world.spawn(
            "a",
            SpawnFields {
                position: Some(Vec3::new(1.0, 2.0, 3.0)),
                ..SpawnFields::of_kind("player")
            },
        );
        assert_eq!(world.len(), 1);
        let e = world.get("a").unwrap();
        assert!(matches!(e.kind, EntityKind::Player(_)));
        assert_eq!(e.color, Rgba::WHITE);
        assert!(e.meta.is_empty());
        assert_eq!(e.position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn spawn_fields_parse_from_params() {
        let params = obj(json!({
            "entity_id": "p",
            "type": "pet",
            "position": [0, 1, 0],
            "behavior": {"target_id": "owner"},
            "stats": {"loyalty": 400},
        }));
        let fields = SpawnFields::from_params(&params).unwrap();
        let mut world = World::default();
        let e = world.spawn("p", fields);
        let EntityKind::Pet(PetExt { stats, behavior }) = e.kind else {
            panic!("expected pet");
        };
        assert_eq!(behavior.mode, BehaviorMode::Follow);
        assert_eq!(behavior.target_id.as_deref(), Some("owner"));
        assert_eq!(stats.loyalty, 100.0);
        assert_eq!(e.position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn spawn_fields_reject_short_vectors() {
        let params = obj(json!({"position": [1, 2]}));
        assert!(SpawnFields::from_params(&params).is_err());
    }

    #[test]
    fn missing_ids_report_not_found_and_leave_store_unchanged() {
        let mut world = World::seeded();
        let before = world.snapshot();
        assert_eq!(
            world.move_entity("ghost", Vec3::ONE),
            Err(StoreError::NotFound { id: "ghost".into() })
        );
        assert!(world.recolor("ghost", Rgba::RED).is_err());
        assert!(world.update_stats("ghost", &Map::new()).is_err());
        assert_eq!(world.snapshot(), before);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut world = World::seeded();
        assert!(world.delete("cube_0"));
        assert!(!world.delete("cube_0"));
        assert!(world.is_empty());
    }

    #[test]
    fn update_stats_partially_applies_player_delta() {
        let mut world = World::default();
        world.spawn("p", SpawnFields::of_kind("player"));
        let update = world
            .update_stats(
                "p",
                &obj(json!({
                    "health": -5,
                    "stamina": 40,
                    "mana": -1,
                    "level": 0,
                    "experience": 12,
                    "title": "hero",
                })),
            )
            .unwrap();
        assert_eq!(update.skipped.len(), 4);
        let EntityKind::Player(ext) = update.entity.kind else {
            panic!("expected player");
        };
        assert_eq!(ext.stats.health, 100.0);
        assert_eq!(ext.stats.stamina, 40.0);
        assert_eq!(ext.stats.mana, 100.0);
        assert_eq!(ext.stats.level, 1.0);
        assert_eq!(ext.stats.experience, 12.0);
    }

    #[test]
    fn update_stats_clamps_pet_loyalty() {
        let mut world = World::default();
        world.spawn("pet", SpawnFields::of_kind("pet"));
        let update = world
            .update_stats("pet", &obj(json!({"loyalty": 150, "health": -3})))
            .unwrap();
        let EntityKind::Pet(ext) = update.entity.kind else {
            panic!("expected pet");
        };
        assert_eq!(ext.stats.loyalty, 100.0);
        assert_eq!(ext.stats.health, 50.0);
        assert_eq!(update.skipped.len(), 1);
    }

    #[test]
    fn update_stats_rejects_kinds_without_stats() {
        let mut world = World::seeded();
        assert_eq!(
            world.update_stats("cube_0", &obj(json!({"health": 1}))),
            Err(StoreError::StatsUnsupported {
                id: "cube_0".into(),
                kind: "cube".into()
            })
        );
    }

    #[test]
    fn list_is_a_copy() {
        let mut world = World::seeded();
        let listed = world.list();
        world.move_entity("cube_0", Vec3::ONE).unwrap();
        assert_eq!(listed[0].position, Vec3::ZERO);
    }

    #[test]
    fn tick_spins_cubes() {
        let mut world = World::default();
        world.spawn("cube", SpawnFields::of_kind("cube"));
        world.spawn("p", SpawnFields::of_kind("player"));
        world.tick(0.5);
        assert_eq!(world.get("cube").unwrap().rotation.y, 0.25);
        assert_eq!(world.get("p").unwrap().rotation.y, 0.0);
        assert_eq!(world.frame_count(), 1);
        assert_eq!(world.time(), 0.5);
    }

    #[test]
    fn following_pet_converges_to_radius() {
        let mut world = World::default();
        world.spawn("owner", SpawnFields::of_kind("player"));
        pet_following(&mut world, "pet", Vec3::new(5.0, 0.0, 0.0), "owner");

        let mut last = 5.0;
        for _ in 0..60 {
            world.tick(1.0 / 30.0);
            let d = world.get("pet").unwrap().position.distance(Vec3::ZERO);
            assert!(d < last, "distance must strictly decrease");
            assert!(d >= FOLLOW_RADIUS);
            last = d;
        }
        assert!(last - FOLLOW_RADIUS < 0.01);
    }

    #[test]
    fn first_follow_step_closes_ten_percent_of_excess() {
        let mut world = World::default();
        world.spawn("owner", SpawnFields::of_kind("player"));
        pet_following(&mut world, "pet", Vec3::new(0.0, 0.0, 5.0), "owner");
        world.tick(10.0);
        let p = world.get("pet").unwrap().position;
        assert!((p.z - 4.7).abs() < 1e-5);
    }

    #[test]
    fn pets_without_resolvable_target_stay_put() {
        let mut world = World::default();
        pet_following(&mut world, "lost", Vec3::new(9.0, 0.0, 0.0), "nobody");
        pet_following(&mut world, "selfish", Vec3::new(3.0, 0.0, 0.0), "selfish");
        world.tick(0.1);
        assert_eq!(world.get("lost").unwrap().position, Vec3::new(9.0, 0.0, 0.0));
        assert_eq!(world.get("selfish").unwrap().position, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn snapshot_bytes_are_deterministic() {
        let build = || {
            let mut world = World::seeded();
            world.spawn("b", SpawnFields::of_kind("pet"));
            world.spawn("a", SpawnFields::of_kind("player"));
            world.tick(0.25);
            serde_json::to_string(&world.snapshot()).unwrap()
        };
        assert_eq!(build(), build());
    }
}
