//! Command pipeline.
//!
//! Turns a client request (command name + JSON params) into a typed
//! [`Command`], runs it against the [`World`] and reports an [`Outcome`].
//! Nothing here broadcasts; the caller decides what to do with the event.

use std::panic::{self, AssertUnwindSafe};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    event::SceneEvent,
    math::{Rgba, Vec3},
    world::{SpawnFields, StoreError, World},
};

/// Why a request never reached the store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("request does not name a command")]
    MissingName,
    #[error("{command}: missing required parameter '{param}'")]
    MissingParam {
        command: &'static str,
        param: &'static str,
    },
    #[error("{command}: invalid parameter '{param}': {reason}")]
    InvalidParam {
        command: &'static str,
        param: &'static str,
        reason: String,
    },
    #[error("{command}: internal error: {reason}")]
    Internal {
        command: &'static str,
        reason: String,
    },
}

/// A validated command, one variant per handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SpawnEntity {
        entity_id: String,
        fields: SpawnFields,
    },
    MoveEntity {
        entity_id: String,
        position: Vec3,
    },
    SetColor {
        entity_id: String,
        color: Rgba,
    },
    UpdateStats {
        entity_id: String,
        stats: Map<String, Value>,
    },
    DeleteEntity {
        entity_id: String,
    },
}

impl Command {
    pub const NAMES: [&'static str; 5] = [
        "spawn_entity",
        "move_entity",
        "set_color",
        "update_stats",
        "delete_entity",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::SpawnEntity { .. } => "spawn_entity",
            Command::MoveEntity { .. } => "move_entity",
            Command::SetColor { .. } => "set_color",
            Command::UpdateStats { .. } => "update_stats",
            Command::DeleteEntity { .. } => "delete_entity",
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Command::SpawnEntity { entity_id, .. }
            | Command::MoveEntity { entity_id, .. }
            | Command::SetColor { entity_id, .. }
            | Command::UpdateStats { entity_id, .. }
            | Command::DeleteEntity { entity_id } => entity_id,
        }
    }

    /// Resolves a command name and checks its required parameters.
    pub fn parse(name: &str, params: &Map<String, Value>) -> Result<Self, CommandError> {
        match name {
            "spawn_entity" => {
                let command = "spawn_entity";
                let entity_id = entity_id(command, params)?;
                let fields =
                    SpawnFields::from_params(params).map_err(|e| CommandError::InvalidParam {
                        command,
                        param: "fields",
                        reason: e.to_string(),
                    })?;
                Ok(Command::SpawnEntity { entity_id, fields })
            }
            "move_entity" => {
                let command = "move_entity";
                Ok(Command::MoveEntity {
                    entity_id: entity_id(command, params)?,
                    position: required(command, "position", params)?,
                })
            }
            "set_color" => {
                let command = "set_color";
                Ok(Command::SetColor {
                    entity_id: entity_id(command, params)?,
                    color: required(command, "color", params)?,
                })
            }
            "update_stats" => {
                let command = "update_stats";
                Ok(Command::UpdateStats {
                    entity_id: entity_id(command, params)?,
                    stats: required(command, "stats", params)?,
                })
            }
            "delete_entity" => Ok(Command::DeleteEntity {
                entity_id: entity_id("delete_entity", params)?,
            }),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Maps a push-dialect `client_input` payload onto a command.
    ///
    /// The payload names its operation under `action` and the entity under
    /// `id`. `spawn_cube` spawns a cube, defaulting the id to
    /// `cube_<entity count>`; any other action is parsed as a command name.
    pub fn from_client_input(
        payload: &Map<String, Value>,
        entity_count: usize,
    ) -> Result<Self, CommandError> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .ok_or(CommandError::MissingName)?;

        let mut params = payload.clone();
        params.remove("action");
        if let Some(id) = params.remove("id") {
            params.entry("entity_id").or_insert(id);
        }

        if action == "spawn_cube" {
            params
                .entry("entity_id")
                .or_insert_with(|| Value::String(format!("cube_{entity_count}")));
            params.insert("type".into(), Value::String("cube".into()));
            return Self::parse("spawn_entity", &params);
        }
        Self::parse(action, &params)
    }

    /// Runs the handler for this command.
    pub fn apply(self, world: &mut World) -> Result<SceneEvent, StoreError> {
        match self {
            Command::SpawnEntity { entity_id, fields } => {
                Ok(SceneEvent::EntitySpawned(world.spawn(&entity_id, fields)))
            }
            Command::MoveEntity {
                entity_id,
                position,
            } => world
                .move_entity(&entity_id, position)
                .map(SceneEvent::EntityUpdated),
            Command::SetColor { entity_id, color } => world
                .recolor(&entity_id, color)
                .map(SceneEvent::EntityUpdated),
            Command::UpdateStats { entity_id, stats } => world
                .update_stats(&entity_id, &stats)
                .map(|update| SceneEvent::EntityUpdated(update.entity)),
            Command::DeleteEntity { entity_id } => {
                if world.delete(&entity_id) {
                    Ok(SceneEvent::EntityDeleted { entity_id })
                } else {
                    Err(StoreError::NotFound { id: entity_id })
                }
            }
        }
    }
}

fn entity_id(command: &'static str, params: &Map<String, Value>) -> Result<String, CommandError> {
    match params.get("entity_id") {
        None | Some(Value::Null) => Err(CommandError::MissingParam {
            command,
            param: "entity_id",
        }),
        Some(Value::String(s)) if s.is_empty() => Err(CommandError::MissingParam {
            command,
            param: "entity_id",
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(CommandError::InvalidParam {
            command,
            param: "entity_id",
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn required<T: serde::de::DeserializeOwned>(
    command: &'static str,
    param: &'static str,
    params: &Map<String, Value>,
) -> Result<T, CommandError> {
    let value = match params.get(param) {
        None | Some(Value::Null) => return Err(CommandError::MissingParam { command, param }),
        Some(v) => v.clone(),
    };
    serde_json::from_value(value).map_err(|e| CommandError::InvalidParam {
        command,
        param,
        reason: e.to_string(),
    })
}

/// What a routed request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The store changed; the event should be fanned out.
    Applied(SceneEvent),
    /// The command referenced a missing entity. No event, nothing to report.
    NotFound(StoreError),
    /// The request was invalid or the handler failed. The store is untouched.
    Rejected(CommandError),
}

impl Outcome {
    pub fn event(&self) -> Option<&SceneEvent> {
        match self {
            Outcome::Applied(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<SceneEvent> {
        match self {
            Outcome::Applied(ev) => Some(ev),
            _ => None,
        }
    }
}

/// Parses and executes a named command.
pub fn route(world: &mut World, name: &str, params: &Map<String, Value>) -> Outcome {
    debug!(command = %name, "Routing command");
    match Command::parse(name, params) {
        Ok(cmd) => execute(world, cmd),
        Err(e) => {
            warn!(command = %name, error = %e, "Invalid command");
            Outcome::Rejected(e)
        }
    }
}

/// Executes a parsed command. A panicking handler is reported as
/// [`CommandError::Internal`] instead of unwinding into the caller.
pub fn execute(world: &mut World, cmd: Command) -> Outcome {
    let command = cmd.name();
    let entity_id = cmd.entity_id().to_string();
    match panic::catch_unwind(AssertUnwindSafe(|| cmd.apply(world))) {
        Ok(Ok(ev)) => Outcome::Applied(ev),
        Ok(Err(e)) => {
            debug!(command, entity_id = %entity_id, error = %e, "Command had no effect");
            Outcome::NotFound(e)
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            warn!(command, entity_id = %entity_id, %reason, "Command handler failed");
            Outcome::Rejected(CommandError::Internal { command, reason })
        }
    }
}
