//! Server implementation.
//!
//! [`SceneServer`] is the explicit server context: it owns the world, the
//! session registry and the observer, and every handler goes through it.
//! It performs no IO itself; outbound traffic is queued on each session's
//! channel.
//!
//! [`run`] drives it from a single control task that interleaves inbound
//! messages with the tick deadline, so the world is never mutated from two
//! places at once. Per-connection tasks only move frames between the socket
//! and the channels.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use scene_shared::{
    command::{self, Command, CommandError, Outcome},
    config::ServerConfig,
    event::{NullObserver, SceneEvent, SceneObserver},
    net::{FrameConn, FrameListener},
    protocol::{self, CommandRequest, Dialect, Envelope, MessageType, ProtocolError},
    world::World,
};
use serde_json::{Map, Value};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    registry::{BroadcastReport, Outbound, SendError, SessionId, SessionRegistry},
    scheduler::TickClock,
};

/// Messages from connection tasks to the control task.
#[derive(Debug)]
pub enum Inbound {
    Connected { id: SessionId, tx: Outbound },
    Message { id: SessionId, text: String },
    Closed { id: SessionId },
}

/// What handling one inbound message led to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// An event was fanned out to every session.
    Broadcast {
        event_type: &'static str,
        report: BroadcastReport,
    },
    /// A reply went to the sender only.
    Replied(MessageType),
    /// The world changed; the next snapshot carries it.
    Applied,
    /// Nothing to send.
    Ignored,
}

/// Authoritative scene server context.
pub struct SceneServer {
    cfg: ServerConfig,
    world: World,
    sessions: SessionRegistry,
    observer: Box<dyn SceneObserver>,
}

impl SceneServer {
    pub fn new(cfg: ServerConfig) -> Self {
        Self::with_observer(cfg, Box::new(NullObserver))
    }

    pub fn with_observer(cfg: ServerConfig, observer: Box<dyn SceneObserver>) -> Self {
        let world = if cfg.seed_default_entity {
            World::seeded()
        } else {
            World::default()
        };
        Self {
            cfg,
            world,
            sessions: SessionRegistry::new(),
            observer,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Registers a session, greets it and sends it the current snapshot.
    pub fn connect(&mut self, id: SessionId, tx: Outbound) {
        self.sessions.add(id, tx);
        info!(session = id.0, sessions = self.sessions.len(), "Client connected");

        let hello = protocol::hello(&self.cfg.greeting, id.0, self.cfg.sync_mode);
        self.send(id, &hello);
        match protocol::snapshot(self.cfg.sync_mode, &self.world.snapshot()) {
            Ok(snap) => self.send(id, &snap),
            Err(e) => error!(session = id.0, error = %e, "Failed to encode catch-up snapshot"),
        }
    }

    /// Drops a session. Returns `false` if it was already gone.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        let removed = self.sessions.remove(id);
        if removed {
            info!(session = id.0, sessions = self.sessions.len(), "Client disconnected");
        }
        removed
    }

    pub fn handle_inbound(&mut self, msg: Inbound) {
        match msg {
            Inbound::Connected { id, tx } => self.connect(id, tx),
            Inbound::Message { id, text } => {
                let reaction = self.handle_text(id, &text);
                debug!(session = id.0, ?reaction, "Handled message");
            }
            Inbound::Closed { id } => {
                self.disconnect(id);
            }
        }
    }

    /// Decodes and dispatches one inbound message from `from`.
    pub fn handle_text(&mut self, from: SessionId, text: &str) -> Reaction {
        let env = match protocol::decode(text) {
            Ok(env) => env,
            Err(ProtocolError::UnknownType(msg_type)) => {
                debug!(session = from.0, %msg_type, "Unhandled message type from client");
                return Reaction::Ignored;
            }
            Err(e) => {
                warn!(session = from.0, error = %e, "Protocol error");
                return self.reply_error(from, self.cfg.sync_mode, &e.to_string());
            }
        };

        match env.msg_type {
            MessageType::Command => self.on_command(from, &env),
            MessageType::ClientInput => self.on_client_input(from, &env.payload),
            MessageType::Ping | MessageType::CommandPing => {
                self.send(from, &protocol::pong());
                Reaction::Replied(MessageType::Pong)
            }
            other => {
                debug!(session = from.0, msg_type = %other, "Unhandled message type from client");
                Reaction::Ignored
            }
        }
    }

    fn on_command(&mut self, from: SessionId, env: &Envelope) -> Reaction {
        let req: CommandRequest = match env.payload_as("command request") {
            Ok(req) => req,
            Err(e) => {
                warn!(session = from.0, error = %e, "Protocol error");
                return self.reply_error(from, Dialect::Command, &e.to_string());
            }
        };
        let Some(name) = req.command else {
            warn!(session = from.0, "Command request without a name");
            return self.reply_error(from, Dialect::Command, &CommandError::MissingName.to_string());
        };

        self.observer.on_command_received(&name, &req.params);
        match command::route(&mut self.world, &name, &req.params) {
            Outcome::Applied(ev) => self.broadcast_event(&ev),
            Outcome::NotFound(_) => Reaction::Ignored,
            Outcome::Rejected(e) => self.reply_error(from, Dialect::Command, &e.to_string()),
        }
    }

    fn on_client_input(&mut self, from: SessionId, payload: &Map<String, Value>) -> Reaction {
        let action = payload.get("action").and_then(Value::as_str).unwrap_or_default();
        self.observer.on_command_received(action, payload);

        let cmd = match Command::from_client_input(payload, self.world.len()) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(session = from.0, error = %e, "Invalid client input");
                return self.reply_error(from, Dialect::Push, &e.to_string());
            }
        };
        match command::execute(&mut self.world, cmd) {
            Outcome::Applied(ev) if self.cfg.sync_mode == Dialect::Command => {
                self.broadcast_event(&ev)
            }
            Outcome::Applied(_) => Reaction::Applied,
            Outcome::NotFound(_) => Reaction::Ignored,
            Outcome::Rejected(e) => self.reply_error(from, Dialect::Push, &e.to_string()),
        }
    }

    /// Advances the world by `dt` seconds. In push mode the new snapshot is
    /// broadcast and the report returned.
    pub fn tick(&mut self, dt: f32) -> Option<BroadcastReport> {
        self.world.tick(dt);
        self.observer.on_world_update(&self.world);

        if self.cfg.sync_mode != Dialect::Push {
            return None;
        }
        if self.sessions.is_empty() {
            return Some(BroadcastReport::default());
        }
        match protocol::snapshot(Dialect::Push, &self.world.snapshot()) {
            Ok(snap) => Some(self.broadcast(&snap)),
            Err(e) => {
                error!(error = %e, "Failed to encode world snapshot");
                None
            }
        }
    }

    /// Sends `env` to every session and drops the ones that could not take it.
    pub fn broadcast(&mut self, env: &Envelope) -> BroadcastReport {
        let text: Arc<str> = env.encode().into();
        let report = self.sessions.broadcast(&text);
        if !report.is_clean() {
            let dropped = self.sessions.prune(&report.failed);
            info!(dropped, sessions = self.sessions.len(), "Dropped unreachable sessions");
        }
        report
    }

    fn broadcast_event(&mut self, ev: &SceneEvent) -> Reaction {
        match protocol::event(ev) {
            Ok(env) => {
                let report = self.broadcast(&env);
                debug!(
                    event_type = ev.event_type(),
                    entity_id = %ev.entity_id(),
                    delivered = report.delivered.len(),
                    "Broadcast event"
                );
                Reaction::Broadcast {
                    event_type: ev.event_type(),
                    report,
                }
            }
            Err(e) => {
                error!(event_type = ev.event_type(), error = %e, "Failed to encode event");
                Reaction::Ignored
            }
        }
    }

    fn reply_error(&mut self, to: SessionId, dialect: Dialect, text: &str) -> Reaction {
        if !self.cfg.reply_errors {
            return Reaction::Ignored;
        }
        let env = protocol::error_reply(dialect, text);
        self.send(to, &env);
        Reaction::Replied(env.msg_type)
    }

    fn send(&mut self, to: SessionId, env: &Envelope) {
        match self.sessions.send_to(to, env.encode().into()) {
            Ok(()) => {}
            Err(SendError::Closed(id)) => {
                debug!(session = id.0, "Session closed; dropping it");
                self.sessions.remove(id);
            }
            Err(e) => debug!(error = %e, "Send skipped"),
        }
    }
}

/// Runs the server on `listener` until the task is dropped.
pub async fn run(mut server: SceneServer, listener: FrameListener) -> anyhow::Result<()> {
    let local = listener.local_addr()?;
    info!(
        %local,
        tick_hz = server.config().tick_hz,
        mode = server.config().sync_mode.as_str(),
        "Scene server running"
    );

    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    tokio::spawn(accept_loop(listener, inbox_tx));

    let mut clock = TickClock::new(server.config().tick_period(), Instant::now());
    let mut next_tick = Instant::now() + clock.period();

    loop {
        tokio::select! {
            Some(msg) = inbox.recv() => server.handle_inbound(msg),
            _ = time::sleep_until(next_tick) => {
                let started = Instant::now();
                let dt = clock.begin(started);
                server.tick(dt);
                next_tick = Instant::now() + clock.sleep_after(started.elapsed());
            }
        }
    }
}

async fn accept_loop(listener: FrameListener, inbox: mpsc::UnboundedSender<Inbound>) {
    loop {
        match listener.accept().await {
            Ok((conn, peer)) => {
                let id = SessionId::new_unique();
                debug!(session = id.0, %peer, "Accepted connection");
                if !spawn_session(id, conn, inbox.clone()) {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Starts the IO tasks of one connection. Returns `false` once the control
/// task is gone.
fn spawn_session(id: SessionId, conn: FrameConn, inbox: mpsc::UnboundedSender<Inbound>) -> bool {
    let (mut reader, mut writer) = conn.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<str>>();
    if inbox.send(Inbound::Connected { id, tx }).is_err() {
        return false;
    }

    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = writer.send_text(&text).await {
                debug!(session = id.0, error = %e, "Write failed");
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match reader.recv_text().await {
                Ok(Some(text)) => {
                    if inbox.send(Inbound::Message { id, text }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(session = id.0, error = %e, "Read failed");
                    break;
                }
            }
        }
        let _ = inbox.send(Inbound::Closed { id });
    });
    true
}

/// Helper for tests: bind to an ephemeral localhost port and run in the
/// background.
pub async fn spawn_ephemeral(
    cfg: ServerConfig,
) -> anyhow::Result<(SocketAddr, JoinHandle<anyhow::Result<()>>)> {
    let listener =
        FrameListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(run(SceneServer::new(cfg), listener));
    Ok((addr, handle))
}
