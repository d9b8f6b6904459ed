//! Local replica.
//!
//! The server is authoritative; the replica only mirrors what it was told.
//! Full snapshots (`world_state` / `STATE`) replace the replica wholesale,
//! `EVENT`s patch single entities in between. Positions from the previous
//! snapshot are kept so renderers can interpolate.

use std::collections::BTreeMap;

use scene_shared::{
    entity::Entity,
    event::SceneEvent,
    math::Vec3,
    protocol::{Dialect, Envelope, MessageType, ProtocolError},
    world::WorldSnapshot,
};
use tracing::debug;

/// Client-side copy of the scene.
#[derive(Debug, Default)]
pub struct Replica {
    entities: BTreeMap<String, Entity>,
    previous: BTreeMap<String, Vec3>,
    time: f64,
    frame_count: u64,
    session_id: Option<u64>,
    mode: Option<Dialect>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one server message. Returns `true` if the entities changed.
    pub fn apply(&mut self, env: &Envelope) -> Result<bool, ProtocolError> {
        match env.msg_type {
            MessageType::Hello => {
                self.session_id = env.payload.get("session_id").and_then(|v| v.as_u64());
                self.mode = env
                    .payload
                    .get("mode")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok());
                Ok(false)
            }
            MessageType::WorldState | MessageType::State => {
                let snap: WorldSnapshot = env.payload_as("world snapshot")?;
                self.apply_snapshot(snap);
                Ok(true)
            }
            MessageType::Event => {
                let ev: SceneEvent = env.payload_as("scene event")?;
                self.apply_event(ev);
                Ok(true)
            }
            other => {
                debug!(msg_type = %other, "Replica ignores message");
                Ok(false)
            }
        }
    }

    pub fn apply_snapshot(&mut self, snap: WorldSnapshot) {
        self.previous = self
            .entities
            .iter()
            .map(|(id, e)| (id.clone(), e.position))
            .collect();
        self.entities = snap.entities;
        self.time = snap.time;
        self.frame_count = snap.frame_count;
    }

    pub fn apply_event(&mut self, ev: SceneEvent) {
        match ev {
            SceneEvent::EntitySpawned(e) | SceneEvent::EntityUpdated(e) => {
                self.entities.insert(e.entity_id.clone(), e);
            }
            SceneEvent::EntityDeleted { entity_id } => {
                self.entities.remove(&entity_id);
                self.previous.remove(&entity_id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Server time of the last snapshot.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Session id from the greeting, once received.
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    pub fn mode(&self) -> Option<Dialect> {
        self.mode
    }

    /// Interpolated position of an entity.
    ///
    /// `alpha` should be in $[0,1]$ where 0 = previous snapshot, 1 = latest.
    /// Entities unknown to the previous snapshot sit at their latest position.
    pub fn interp_position(&self, id: &str, alpha: f32) -> Option<Vec3> {
        let latest = self.entities.get(id)?.position;
        Some(match self.previous.get(id) {
            Some(&prev) => prev.lerp(latest, alpha),
            None => latest,
        })
    }
}
