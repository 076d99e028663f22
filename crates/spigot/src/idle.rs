//! Idle shutdown: terminate the whole bridge after a configured span with no
//! active sessions.
//!
//! Two states: armed (a timer task is scheduled) and disarmed. Every registry
//! mutation reports the new size through [`IdleController::on_registry_changed`],
//! which always cancels the previous timer before deciding the next state, so
//! two timers can never overlap.

use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::shutdown::{ShutdownReason, ShutdownSender};

pub struct IdleController {
    /// Configured span. `None` disables the controller entirely.
    span: Option<Duration>,
    /// The armed timer task, if any.
    timer: Option<JoinHandle<()>>,
    shutdown_tx: ShutdownSender,
}

impl IdleController {
    /// A zero span is treated the same as no span: permanently disarmed.
    pub fn new(span: Option<Duration>, shutdown_tx: ShutdownSender) -> Self {
        let span = span.filter(|s| !s.is_zero());
        Self {
            span,
            timer: None,
            shutdown_tx,
        }
    }

    /// React to a registry mutation. Must run after every add/remove and once
    /// at startup with size 0, so a bridge that never sees a connection still
    /// shuts itself down.
    pub fn on_registry_changed(&mut self, size: usize) {
        let Some(span) = self.span else {
            return;
        };

        self.disarm();
        if size > 0 {
            return;
        }

        debug!("No active sessions, arming idle shutdown in {:?}", span);
        let tx = self.shutdown_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(span).await;
            info!("No sessions connected for {:?}, shutting down", span);
            let _ = tx.send(ShutdownReason::Idle).await;
        }));
    }

    /// Cancel any armed timer. Runs on every shutdown path before teardown so
    /// a late timer cannot fire into a half-torn-down process.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for IdleController {
    fn drop(&mut self) {
        self.disarm();
    }
}
