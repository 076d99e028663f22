//! Session bookkeeping: one entry per connected client.

use log::info;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Per-session delivery buffer, in messages. A connection that falls this far
/// behind is treated as failed rather than allowed to stall the fan-out.
pub const SESSION_BUFFER_SIZE: usize = 256;

/// Why a delivery to one session failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("delivery buffer full")]
    Backlogged,
}

/// One connected client: its transport-assigned id and delivery channel.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    tx: mpsc::Sender<Value>,
}

impl Session {
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Value>) -> Self {
        Self { id: id.into(), tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Push one decoded message to this client.
    pub fn deliver(&self, message: Value) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backlogged,
        })
    }
}

/// Insertion-ordered table of active sessions.
///
/// Owned by the bridge behind a single lock; fan-out iterates in insertion
/// order so delivery order is deterministic.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. An existing entry with the same id is replaced,
    /// keeping each id unique in the table.
    pub fn add(&mut self, session: Session) {
        self.remove(session.id());
        info!(
            "Session {} registered ({} active)",
            session.id(),
            self.sessions.len() + 1
        );
        self.sessions.push(session);
    }

    /// Remove a session by id. Returns whether an entry was removed; absent
    /// ids are a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id() != id);
        self.sessions.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
