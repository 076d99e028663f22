//! Shutdown coordination.
//!
//! Every way the bridge can terminate funnels into a single
//! [`ShutdownReason`] channel. The binary receives the first reason, tears
//! down (disarm idle timer, kill the child), and exits with the mapped code.

use std::fmt;

use tokio::sync::mpsc;

/// Why the bridge is terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The idle controller fired: no sessions for the configured span.
    Idle,
    /// The subprocess exited. Carries the exit code (signal death maps to 1).
    ChildExit(i32),
    /// SIGINT/SIGTERM received.
    Signal,
}

impl ShutdownReason {
    /// Exit code for the bridge process itself.
    ///
    /// A child crash propagates the child's code; voluntary shutdown
    /// (idle timeout, external signal) is a clean exit.
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::ChildExit(code) => code,
            ShutdownReason::Idle | ShutdownReason::Signal => 0,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Idle => write!(f, "idle timeout"),
            ShutdownReason::ChildExit(code) => write!(f, "child exited with code {}", code),
            ShutdownReason::Signal => write!(f, "termination signal"),
        }
    }
}

/// Sender half of the shutdown funnel.
pub type ShutdownSender = mpsc::Sender<ShutdownReason>;

/// Create the shutdown funnel channel.
pub fn channel() -> (ShutdownSender, mpsc::Receiver<ShutdownReason>) {
    mpsc::channel(4)
}
