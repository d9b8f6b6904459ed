//! Scene events and observers.
//!
//! A [`SceneEvent`] describes one state change caused by a command. The
//! server fans it out; nothing here sends anything.
//!
//! Observers get a read-only look at commands and ticks. The default
//! observer does nothing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{entity::Entity, world::World};

/// Outbound description of a state change. Serializes as
/// `{"event_type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum SceneEvent {
    EntitySpawned(Entity),
    EntityUpdated(Entity),
    EntityDeleted { entity_id: String },
}

impl SceneEvent {
    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            SceneEvent::EntitySpawned(_) => "entity_spawned",
            SceneEvent::EntityUpdated(_) => "entity_updated",
            SceneEvent::EntityDeleted { .. } => "entity_deleted",
        }
    }

    /// Id of the entity the event is about.
    pub fn entity_id(&self) -> &str {
        match self {
            SceneEvent::EntitySpawned(e) | SceneEvent::EntityUpdated(e) => &e.entity_id,
            SceneEvent::EntityDeleted { entity_id } => entity_id,
        }
    }
}

/// Hook points for passive observers of the scene.
pub trait SceneObserver: Send {
    fn on_command_received(&mut self, _command: &str, _params: &Map<String, Value>) {}

    fn on_world_update(&mut self, _world: &World) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl SceneObserver for NullObserver {}
