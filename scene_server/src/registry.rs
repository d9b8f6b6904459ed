//! Session registry.
//!
//! Membership is the only per-session state: an id and the sending side of
//! the session's outbound queue. Queues are unbounded, so a send never
//! blocks the control loop; it only fails once the session's writer is gone.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::mpsc;
use tracing::debug;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn new_unique() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sending side of a session's outbound queue.
pub type Outbound = mpsc::UnboundedSender<Arc<str>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("session {0:?} is not registered")]
    UnknownSession(SessionId),
    #[error("session {0:?} is closed")]
    Closed(SessionId),
}

/// Per-recipient result of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<SessionId>,
    pub failed: Vec<SessionId>,
}

impl BroadcastReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Active sessions, in id order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Outbound>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: SessionId, tx: Outbound) {
        self.sessions.insert(id, tx);
    }

    /// Removes a session. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    /// Queues a message for one session.
    pub fn send_to(&self, id: SessionId, text: Arc<str>) -> Result<(), SendError> {
        let tx = self
            .sessions
            .get(&id)
            .ok_or(SendError::UnknownSession(id))?;
        tx.send(text).map_err(|_| SendError::Closed(id))
    }

    /// Queues a message for every session. A failed recipient is recorded
    /// and skipped; it never stops delivery to the others.
    pub fn broadcast(&self, text: &Arc<str>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (&id, tx) in &self.sessions {
            match tx.send(Arc::clone(text)) {
                Ok(()) => report.delivered.push(id),
                Err(_) => {
                    debug!(session = id.0, "Broadcast delivery failed");
                    report.failed.push(id);
                }
            }
        }
        report
    }

    /// Removes every listed session; returns how many were present.
    pub fn prune(&mut self, ids: &[SessionId]) -> usize {
        ids.iter().filter(|&&id| self.remove(id)).count()
    }
}
