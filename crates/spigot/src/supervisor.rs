//! Child process supervision.
//!
//! Owns the bridged subprocess: spawns it under a shell, hands its output
//! streams to the bridge for pumping, serializes writes to its stdin, and
//! reports its exit through the shutdown funnel. A dead child is fatal for
//! the whole bridge; mid-session protocol state inside the child cannot be
//! reconstructed, so there is no restart.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, watch};

use crate::shutdown::{ShutdownReason, ShutdownSender};

/// Handle to the running subprocess.
pub struct ChildSupervisor {
    stdin: Mutex<ChildStdin>,
    kill_tx: mpsc::Sender<()>,
    exited: watch::Receiver<bool>,
    pid: u32,
}

impl ChildSupervisor {
    /// Spawn `command` under `sh -c` with piped stdio, so shell syntax in the
    /// command line is honored.
    ///
    /// Returns the supervisor plus the child's stdout/stderr for the bridge
    /// to pump. A background task waits on the child and sends
    /// [`ShutdownReason::ChildExit`] when it dies for any reason.
    pub fn spawn(
        command: &str,
        shutdown_tx: ShutdownSender,
    ) -> Result<(Arc<Self>, ChildStdout, ChildStderr)> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn child command: {command}"))?;

        let pid = child.id().unwrap_or(0);
        info!("Spawned child process (pid={}): {}", pid, command);

        let stdin = child.stdin.take().context("child stdin not piped")?;
        let stdout = child.stdout.take().context("child stdout not piped")?;
        let stderr = child.stderr.take().context("child stderr not piped")?;

        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let (exited_tx, exited) = watch::channel(false);

        // Wait task: owns the child, honors kill requests, reports exit.
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx.recv() => None,
            };
            let status = match status {
                Some(status) => status,
                None => {
                    debug!("Killing child process (pid={})", pid);
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill child process (pid={}): {}", pid, e);
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => {
                    info!("Child process exited: {} (pid={})", status, pid);
                    status.code().unwrap_or(1)
                }
                Err(e) => {
                    warn!("Failed waiting on child process (pid={}): {}", pid, e);
                    1
                }
            };

            let _ = exited_tx.send(true);
            let _ = shutdown_tx.send(ShutdownReason::ChildExit(code)).await;
        });

        let supervisor = Arc::new(Self {
            stdin: Mutex::new(stdin),
            kill_tx,
            exited,
            pid,
        });

        Ok((supervisor, stdout, stderr))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Write one line to the child's stdin, appending the terminator and
    /// flushing. Writes from different callers are serialized by the lock.
    pub async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        debug!("Wrote {} bytes to child stdin", line.len() + 1);
        Ok(())
    }

    /// Request child termination. Idempotent: once a kill has been requested
    /// (or the child has already exited) further calls are no-ops.
    pub fn kill(&self) {
        let _ = self.kill_tx.try_send(());
    }

    /// Wait until the child has been reaped.
    pub async fn wait_exited(&self) {
        let mut exited = self.exited.clone();
        while !*exited.borrow() {
            if exited.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_write_line_appends_single_terminator() {
        let (tx, _rx) = shutdown::channel();
        let (child, stdout, _stderr) = ChildSupervisor::spawn("cat", tx).unwrap();

        child.write_line(r#"{"id":2,"method":"ping"}"#).await.unwrap();

        let mut reader = BufReader::new(stdout).lines();
        let line = timeout(Duration::from_secs(5), reader.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(line, r#"{"id":2,"method":"ping"}"#);

        child.kill();
        child.wait_exited().await;
    }

    #[tokio::test]
    async fn test_exit_code_reported_on_shutdown_channel() {
        let (tx, mut rx) = shutdown::channel();
        let (_child, _stdout, _stderr) = ChildSupervisor::spawn("exit 2", tx).unwrap();

        let reason = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::ChildExit(2));
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let (tx, mut rx) = shutdown::channel();
        let (child, _stdout, _stderr) = ChildSupervisor::spawn("sleep 60", tx).unwrap();

        child.kill();
        child.kill();
        child.wait_exited().await;

        let reason = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        // SIGKILL leaves no exit code; the default non-zero code is used.
        assert_eq!(reason, ShutdownReason::ChildExit(1));
    }
}
