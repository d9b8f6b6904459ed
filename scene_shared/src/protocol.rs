//! Wire protocol.
//!
//! Every message is an envelope `{"type": <string>, "payload": <object>}`.
//! Two vocabularies share the envelope:
//! - push dialect (`hello`, `world_state`, `client_input`, `ping`, `pong`, `error`):
//!   the server pushes a full snapshot every tick.
//! - command dialect (`COMMAND`, `EVENT`, `STATE`, `ERROR`, `PING`): clients
//!   send commands and the server fans out the resulting events.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{event::SceneEvent, world::WorldSnapshot};

/// Which synchronization vocabulary a message (or a server) speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Full snapshot every tick.
    #[default]
    Push,
    /// Events on demand, fanned out per command.
    Command,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Push => "push",
            Dialect::Command => "command",
        }
    }
}

/// A sync mode name other than `push` or `command`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sync mode '{0}' (expected 'push' or 'command')")]
pub struct UnknownDialect(pub String);

impl std::str::FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Dialect::Push),
            "command" => Ok(Dialect::Command),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // ─── Push dialect ───
    Hello,
    WorldState,
    ClientInput,
    Ping,
    Pong,
    Error,

    // ─── Command dialect ───
    Command,
    Event,
    State,
    CommandError,
    CommandPing,
}

impl MessageType {
    pub const ALL: [MessageType; 11] = [
        MessageType::Hello,
        MessageType::WorldState,
        MessageType::ClientInput,
        MessageType::Ping,
        MessageType::Pong,
        MessageType::Error,
        MessageType::Command,
        MessageType::Event,
        MessageType::State,
        MessageType::CommandError,
        MessageType::CommandPing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Hello => "hello",
            MessageType::WorldState => "world_state",
            MessageType::ClientInput => "client_input",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Error => "error",
            MessageType::Command => "COMMAND",
            MessageType::Event => "EVENT",
            MessageType::State => "STATE",
            MessageType::CommandError => "ERROR",
            MessageType::CommandPing => "PING",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// The vocabulary this type belongs to.
    pub fn dialect(self) -> Dialect {
        match self {
            MessageType::Hello
            | MessageType::WorldState
            | MessageType::ClientInput
            | MessageType::Ping
            | MessageType::Pong
            | MessageType::Error => Dialect::Push,
            MessageType::Command
            | MessageType::Event
            | MessageType::State
            | MessageType::CommandError
            | MessageType::CommandPing => Dialect::Command,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope decode/encode failures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string 'type'")]
    MissingType,
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("payload is not a JSON object")]
    PayloadNotObject,
    #[error("payload does not match {expected}: {source}")]
    BadPayload {
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub msg_type: MessageType,
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn new(msg_type: MessageType, payload: Map<String, Value>) -> Self {
        Self { msg_type, payload }
    }

    /// Builds an envelope from any payload that serializes to a JSON object.
    pub fn with<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Self, ProtocolError> {
        match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => Ok(Self::new(msg_type, map)),
            Ok(_) => Err(ProtocolError::PayloadNotObject),
            Err(source) => Err(ProtocolError::BadPayload {
                expected: "object payload",
                source,
            }),
        }
    }

    /// Deserializes the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(
        &self,
        expected: &'static str,
    ) -> Result<T, ProtocolError> {
        serde_json::from_value(Value::Object(self.payload.clone()))
            .map_err(|source| ProtocolError::BadPayload { expected, source })
    }

    pub fn encode(&self) -> String {
        encode(self.msg_type, &self.payload)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode(text)
    }
}

/// Encodes an envelope to JSON text.
pub fn encode(msg_type: MessageType, payload: &Map<String, Value>) -> String {
    let mut obj = Map::with_capacity(2);
    obj.insert("type".into(), Value::String(msg_type.as_str().into()));
    obj.insert("payload".into(), Value::Object(payload.clone()));
    Value::Object(obj).to_string()
}

/// Decodes JSON text into an envelope. An absent or `null` payload becomes an
/// empty object.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let Value::Object(mut obj) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let msg_type = match obj.get("type") {
        Some(Value::String(s)) => {
            MessageType::parse(s).ok_or_else(|| ProtocolError::UnknownType(s.clone()))?
        }
        _ => return Err(ProtocolError::MissingType),
    };
    let payload = match obj.remove("payload") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ProtocolError::PayloadNotObject),
    };
    Ok(Envelope { msg_type, payload })
}

/// `COMMAND` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

// ─── Outbound builders ───

/// Greeting sent once per connection.
pub fn hello(greeting: &str, session_id: u64, dialect: Dialect) -> Envelope {
    let mut payload = Map::new();
    payload.insert("msg".into(), Value::String(greeting.to_string()));
    payload.insert("session_id".into(), Value::from(session_id));
    payload.insert("mode".into(), Value::String(dialect.as_str().into()));
    Envelope::new(MessageType::Hello, payload)
}

/// Full snapshot in the given dialect (`world_state` or `STATE`).
pub fn snapshot(dialect: Dialect, snap: &WorldSnapshot) -> Result<Envelope, ProtocolError> {
    let msg_type = match dialect {
        Dialect::Push => MessageType::WorldState,
        Dialect::Command => MessageType::State,
    };
    Envelope::with(msg_type, snap)
}

pub fn event(ev: &SceneEvent) -> Result<Envelope, ProtocolError> {
    Envelope::with(MessageType::Event, ev)
}

/// Error reply in the given dialect: `error {reason}` or `ERROR {message}`.
pub fn error_reply(dialect: Dialect, text: &str) -> Envelope {
    let (msg_type, key) = match dialect {
        Dialect::Push => (MessageType::Error, "reason"),
        Dialect::Command => (MessageType::CommandError, "message"),
    };
    let mut payload = Map::new();
    payload.insert(key.into(), Value::String(text.to_string()));
    Envelope::new(msg_type, payload)
}

/// `pong` carrying the server's wall-clock time in seconds.
pub fn pong() -> Envelope {
    let ts = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let mut payload = Map::new();
    payload.insert("ts".into(), Value::from(ts));
    Envelope::new(MessageType::Pong, payload)
}
