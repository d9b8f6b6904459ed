//! Client implementation.
//!
//! The client maintains:
//! - One framed TCP connection to the server
//! - A [`Replica`] fed by every snapshot and event it receives

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use scene_shared::{
    net::FrameConn,
    protocol::{self, Dialect, Envelope, MessageType},
};
use serde_json::{Map, Value};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::replica::Replica;

/// High-level scene client.
pub struct SceneClient {
    conn: FrameConn,
    pub replica: Replica,
}

impl SceneClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let conn = FrameConn::connect(addr).await?;
        Ok(Self {
            conn,
            replica: Replica::new(),
        })
    }

    pub async fn send(&mut self, env: &Envelope) -> anyhow::Result<()> {
        self.conn.send_text(&env.encode()).await
    }

    /// Sends raw text, bypassing the envelope encoder.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.conn.send_text(text).await
    }

    /// Sends a `COMMAND`. `params` must be a JSON object.
    pub async fn send_command(&mut self, name: &str, params: Value) -> anyhow::Result<()> {
        let Value::Object(params) = params else {
            anyhow::bail!("command params must be an object");
        };
        let mut payload = Map::new();
        payload.insert("command".into(), Value::String(name.to_string()));
        payload.insert("params".into(), Value::Object(params));
        debug!(command = %name, "Sending command");
        self.send(&Envelope::new(MessageType::Command, payload)).await
    }

    /// Sends a push-dialect `client_input`.
    pub async fn send_input(&mut self, payload: Map<String, Value>) -> anyhow::Result<()> {
        self.send(&Envelope::new(MessageType::ClientInput, payload))
            .await
    }

    /// Sends a ping in the dialect the server greeted us with.
    pub async fn ping(&mut self) -> anyhow::Result<()> {
        let msg_type = match self.replica.mode() {
            Some(Dialect::Command) => MessageType::CommandPing,
            _ => MessageType::Ping,
        };
        self.send(&Envelope::new(msg_type, Map::new())).await
    }

    /// Receives the next message and feeds it to the replica. `Ok(None)`
    /// means the server closed the connection.
    pub async fn recv(&mut self) -> anyhow::Result<Option<Envelope>> {
        match self.conn.recv_text().await? {
            Some(text) => self.accept(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv), but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<Envelope>> {
        match self.conn.recv_timeout(timeout).await? {
            Some(text) => self.accept(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Receives until a message of `msg_type` arrives, skipping others.
    pub async fn recv_type(
        &mut self,
        msg_type: MessageType,
        timeout: Duration,
    ) -> anyhow::Result<Envelope> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let env = time::timeout(left, self.recv())
                .await
                .with_context(|| format!("timed out waiting for {msg_type}"))??
                .with_context(|| format!("connection closed waiting for {msg_type}"))?;
            if env.msg_type == msg_type {
                return Ok(env);
            }
        }
    }

    fn accept(&mut self, text: &str) -> anyhow::Result<Envelope> {
        let env = protocol::decode(text).context("decode server message")?;
        if let Err(e) = self.replica.apply(&env) {
            warn!(msg_type = %env.msg_type, error = %e, "Replica rejected message");
        }
        Ok(env)
    }

    pub fn server_peer(&self) -> anyhow::Result<SocketAddr> {
        self.conn.peer_addr()
    }
}
