//! The bridge coordinator: composes supervisor, framer, registry and idle
//! controller, and owns both data paths.
//!
//! Outbound: child stdout chunks -> framer -> JSON decode -> fan-out to every
//! session. Inbound: one client's message -> one JSON line on the shared
//! child stdin. The child sees a single interleaved stream; correlation is
//! assumed to live in the message ids of the protocol itself.

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::Mutex;

use crate::framing::LineFramer;
use crate::idle::IdleController;
use crate::registry::{Session, SessionRegistry};
use crate::supervisor::ChildSupervisor;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Why an inbound submission was rejected.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The named session is not registered. A client protocol error, never
    /// fatal to the bridge.
    #[error("no active session '{0}'")]
    NoSession(String),
    /// The child's stdin is gone. The wait task escalates the actual death.
    #[error("failed to write to child stdin: {0}")]
    ChildGone(#[from] std::io::Error),
}

pub struct Bridge {
    child: Arc<ChildSupervisor>,
    registry: Mutex<SessionRegistry>,
    idle: Mutex<IdleController>,
}

impl Bridge {
    pub fn new(child: Arc<ChildSupervisor>, idle: IdleController) -> Arc<Self> {
        Arc::new(Self {
            child,
            registry: Mutex::new(SessionRegistry::new()),
            idle: Mutex::new(idle),
        })
    }

    /// Start the output pumps and arm the idle controller for the initially
    /// empty registry, so a bridge that never sees a connection still shuts
    /// itself down.
    pub async fn start(self: &Arc<Self>, stdout: ChildStdout, stderr: ChildStderr) {
        let bridge = Arc::clone(self);
        tokio::spawn(async move { bridge.pump_stdout(stdout).await });
        tokio::spawn(pump_stderr(stderr));

        let size = self.registry.lock().await.len();
        self.idle.lock().await.on_registry_changed(size);
    }

    /// Register a newly connected client and reset the idle controller.
    pub async fn connect(&self, session: Session) {
        let size = {
            let mut registry = self.registry.lock().await;
            registry.add(session);
            registry.len()
        };
        self.idle.lock().await.on_registry_changed(size);
    }

    /// Remove a session and reset the idle controller. Idempotent: an id that
    /// is already gone is a no-op.
    pub async fn disconnect(&self, id: &str) {
        let (removed, size) = {
            let mut registry = self.registry.lock().await;
            (registry.remove(id), registry.len())
        };
        if removed {
            info!("Session {} disconnected ({} active)", id, size);
            self.idle.lock().await.on_registry_changed(size);
        }
    }

    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Inbound path: forward one client message to the shared child stdin as
    /// a single JSON line.
    pub async fn submit(&self, session_id: &str, message: &Value) -> Result<(), SubmitError> {
        {
            let registry = self.registry.lock().await;
            if registry.get(session_id).is_none() {
                return Err(SubmitError::NoSession(session_id.to_string()));
            }
        }

        let line = message.to_string();
        debug!("Session {} -> child: {}", session_id, line);
        self.child.write_line(&line).await?;
        Ok(())
    }

    /// Disarm the idle timer. Every shutdown path runs this before teardown.
    pub async fn disarm_idle(&self) {
        self.idle.lock().await.disarm();
    }

    /// Outbound pump: frame and decode child stdout, fanning each message out
    /// to all sessions in receipt order.
    async fn pump_stdout(self: Arc<Self>, mut stdout: ChildStdout) {
        let mut framer = LineFramer::new();
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);

        loop {
            buf.clear();
            match stdout.read_buf(&mut buf).await {
                Ok(0) => {
                    debug!("Child stdout closed");
                    break;
                }
                Ok(_) => {
                    for line in framer.feed(&buf) {
                        self.dispatch_line(&line).await;
                    }
                }
                Err(e) => {
                    warn!("Error reading child stdout: {}", e);
                    break;
                }
            }
        }
    }

    /// Decode one framed line and fan it out. A malformed line is logged and
    /// dropped; it never reaches a client and never aborts the stream.
    async fn dispatch_line(&self, line: &str) {
        match serde_json::from_str::<Value>(line) {
            Ok(message) => self.fan_out(&message).await,
            Err(e) => warn!("Dropping malformed child output ({}): {}", e, line),
        }
    }

    /// Deliver one message to every session. A failed delivery removes that
    /// session only; the rest of the fan-out proceeds.
    async fn fan_out(&self, message: &Value) {
        let failed: Vec<String> = {
            let registry = self.registry.lock().await;
            registry
                .iter()
                .filter_map(|session| match session.deliver(message.clone()) {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("Delivery to session {} failed: {}", session.id(), e);
                        Some(session.id().to_string())
                    }
                })
                .collect()
        };

        for id in failed {
            self.disconnect(&id).await;
        }
    }
}

/// Child stderr goes to the operator log only, never to clients.
async fn pump_stderr(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if !line.trim().is_empty() {
            debug!("child stderr: {}", line);
        }
    }
}
