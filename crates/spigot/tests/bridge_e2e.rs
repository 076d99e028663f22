//! End-to-end bridge scenarios against real `sh -c` children.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use spigot::bridge::{Bridge, SubmitError};
use spigot::idle::IdleController;
use spigot::registry::Session;
use spigot::shutdown::{self, ShutdownReason};
use spigot::supervisor::ChildSupervisor;

const WAIT: Duration = Duration::from_secs(5);

async fn start_bridge(
    command: &str,
    idle_span: Option<Duration>,
) -> (
    Arc<Bridge>,
    Arc<ChildSupervisor>,
    mpsc::Receiver<ShutdownReason>,
) {
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let (child, stdout, stderr) =
        ChildSupervisor::spawn(command, shutdown_tx.clone()).expect("spawn child");
    let bridge = Bridge::new(
        Arc::clone(&child),
        IdleController::new(idle_span, shutdown_tx),
    );
    bridge.start(stdout, stderr).await;
    (bridge, child, shutdown_rx)
}

fn client(id: &str) -> (Session, mpsc::Receiver<Value>) {
    let (tx, rx) = mpsc::channel(16);
    (Session::new(id, tx), rx)
}

async fn recv(rx: &mut mpsc::Receiver<Value>) -> Value {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("delivery channel closed")
}

#[tokio::test]
async fn echo_child_fans_out_to_all_sessions() {
    let (bridge, child, _shutdown_rx) = start_bridge("cat", None).await;

    let (session_a, mut rx_a) = client("a");
    let (session_b, mut rx_b) = client("b");
    bridge.connect(session_a).await;
    bridge.connect(session_b).await;

    let message = json!({"id": 2, "method": "ping"});
    bridge.submit("a", &message).await.unwrap();

    // The line round-trips through the child's stdio unchanged and reaches
    // every session, not just the submitter.
    assert_eq!(recv(&mut rx_a).await, message);
    assert_eq!(recv(&mut rx_b).await, message);
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());

    child.kill();
    child.wait_exited().await;
}

#[tokio::test]
async fn message_split_across_chunks_arrives_whole_exactly_once() {
    // The child waits for a stdin kick so no output is emitted before the
    // sessions are connected, then writes one message split mid-object.
    let command = r#"read _; printf '{"id":1,"re'; sleep 0.2; printf 'sult":"ok"}\n'"#;
    let (bridge, _child, _shutdown_rx) = start_bridge(command, None).await;

    let (session_a, mut rx_a) = client("a");
    let (session_b, mut rx_b) = client("b");
    bridge.connect(session_a).await;
    bridge.connect(session_b).await;
    bridge.submit("a", &json!({"go": true})).await.unwrap();

    let expected = json!({"id": 1, "result": "ok"});
    assert_eq!(recv(&mut rx_a).await, expected);
    assert_eq!(recv(&mut rx_b).await, expected);
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn malformed_line_is_dropped_without_losing_neighbors() {
    let command = r#"read _; printf '{"id":1}\nnot json\n{"id":3}\n'"#;
    let (bridge, _child, _shutdown_rx) = start_bridge(command, None).await;

    let (session, mut rx) = client("a");
    bridge.connect(session).await;
    bridge.submit("a", &json!({"go": true})).await.unwrap();

    assert_eq!(recv(&mut rx).await, json!({"id": 1}));
    assert_eq!(recv(&mut rx).await, json!({"id": 3}));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_delivery_removes_only_that_session() {
    let (bridge, child, _shutdown_rx) = start_bridge("cat", None).await;

    let (session_a, mut rx_a) = client("a");
    let (session_b, rx_b) = client("b");
    bridge.connect(session_a).await;
    bridge.connect(session_b).await;
    drop(rx_b);

    let message = json!({"id": 5, "result": null});
    bridge.submit("a", &message).await.unwrap();

    assert_eq!(recv(&mut rx_a).await, message);

    // The dead session is reaped by the failed fan-out.
    timeout(WAIT, async {
        while bridge.session_count().await != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("failed session was not removed");

    // A subsequent fan-out only reaches the survivor.
    bridge.submit("a", &json!({"id": 6})).await.unwrap();
    assert_eq!(recv(&mut rx_a).await, json!({"id": 6}));
    assert_eq!(bridge.session_count().await, 1);

    child.kill();
    child.wait_exited().await;
}

#[tokio::test]
async fn submit_without_session_is_rejected() {
    let (bridge, child, _shutdown_rx) = start_bridge("cat", None).await;

    let err = bridge.submit("ghost", &json!({})).await.unwrap_err();
    assert!(matches!(err, SubmitError::NoSession(_)));

    child.kill();
    child.wait_exited().await;
}

#[tokio::test]
async fn child_exit_code_reaches_the_shutdown_funnel() {
    let (_bridge, _child, mut shutdown_rx) = start_bridge("exit 2", None).await;

    let reason = timeout(WAIT, shutdown_rx.recv())
        .await
        .expect("timed out waiting for child exit")
        .expect("shutdown channel closed");
    assert_eq!(reason, ShutdownReason::ChildExit(2));
    assert_eq!(reason.exit_code(), 2);
}

#[tokio::test]
async fn bridge_with_no_connections_shuts_down_idle() {
    let (_bridge, _child, mut shutdown_rx) =
        start_bridge("cat", Some(Duration::from_millis(100))).await;

    let reason = timeout(WAIT, shutdown_rx.recv())
        .await
        .expect("idle timer never fired")
        .expect("shutdown channel closed");
    assert_eq!(reason, ShutdownReason::Idle);
}

#[tokio::test]
async fn connection_holds_off_idle_shutdown() {
    let (bridge, _child, mut shutdown_rx) =
        start_bridge("cat", Some(Duration::from_millis(200))).await;

    let (session, _rx) = client("a");
    bridge.connect(session).await;

    // With a session connected the armed startup timer must not fire.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(shutdown_rx.try_recv().is_err());

    // Dropping to zero sessions re-arms; the timer then fires.
    bridge.disconnect("a").await;
    let reason = timeout(WAIT, shutdown_rx.recv())
        .await
        .expect("idle timer never fired after disconnect")
        .expect("shutdown channel closed");
    assert_eq!(reason, ShutdownReason::Idle);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (bridge, child, _shutdown_rx) = start_bridge("cat", None).await;

    let (session, _rx) = client("a");
    bridge.connect(session).await;
    bridge.disconnect("a").await;
    bridge.disconnect("a").await;
    assert_eq!(bridge.session_count().await, 0);

    child.kill();
    child.wait_exited().await;
}

#[tokio::test]
async fn stderr_output_is_not_delivered_to_sessions() {
    let command = r#"read _; printf 'diagnostic noise\n' >&2; printf '{"id":9}\n'"#;
    let (bridge, _child, _shutdown_rx) = start_bridge(command, None).await;

    let (session, mut rx) = client("a");
    bridge.connect(session).await;
    bridge.submit("a", &json!({"go": true})).await.unwrap();

    assert_eq!(recv(&mut rx).await, json!({"id": 9}));
    assert!(rx.try_recv().is_err());
}
