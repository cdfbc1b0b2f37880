//! Integration tests for the client library: event-sink delivery, the
//! disconnected callback, and idempotent teardown against a live server.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use projboard::client::ProjectClient;
use projboard::events::{ProjectEvents, TaskInfo};
use projboard_server::server::start_server;
use tokio::time::sleep;

/// Sink that records every callback as one rendered line.
#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    fn push(&self, line: String) {
        self.lines.lock().push(line);
    }

    /// Polls until a recorded line equals `wanted`, panicking on timeout.
    async fn wait_for(&self, wanted: &str) {
        self.wait_for_count(wanted, 1).await;
    }

    /// Polls until `wanted` has been recorded at least `count` times.
    async fn wait_for_count(&self, wanted: &str, count: usize) {
        for _ in 0..200 {
            if self.snapshot().iter().filter(|l| *l == wanted).count() >= count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count}x {wanted:?}; got {:?}", self.snapshot());
    }
}

impl ProjectEvents for RecordingSink {
    fn on_system_message(&self, text: &str) {
        self.push(format!("system: {text}"));
    }

    fn on_chat_message(&self, username: &str, text: &str) {
        self.push(format!("chat: {username}: {text}"));
    }

    fn on_users_updated(&self, usernames: &[String]) {
        self.push(format!("users: {}", usernames.join(",")));
    }

    fn on_task_added(&self, task: &TaskInfo) {
        self.push(format!(
            "added: {} {} [{}] by {}",
            task.id, task.title, task.status, task.assigned_by
        ));
    }

    fn on_task_completed(&self, id: u64, title: &str, completed_by: &str) {
        self.push(format!("completed: {id} {title} by {completed_by}"));
    }

    fn on_task_deleted(&self, id: u64, title: &str, deleted_by: &str) {
        self.push(format!("deleted: {id} {title} by {deleted_by}"));
    }

    fn on_disconnected(&self, reason: &str) {
        self.push(format!("disconnected: {reason}"));
    }
}

/// Connects a client and waits for its welcome notice.
async fn connect_client(
    addr: std::net::SocketAddr,
    username: &str,
) -> (ProjectClient, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let client = ProjectClient::new(&addr.to_string(), username, Arc::clone(&sink) as _);
    client.connect().await.expect("connect");
    sink.wait_for(&format!("system: Welcome to the project, {username}!"))
        .await;
    (client, sink)
}

#[tokio::test]
async fn two_clients_share_chat_and_tasks() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (alice, alice_sink) = connect_client(addr, "alice").await;
    let (bob, bob_sink) = connect_client(addr, "bob").await;

    alice.send_chat("hello");
    bob_sink.wait_for("chat: alice: hello").await;
    alice_sink.wait_for("chat: alice: hello").await;

    alice.add_task("Buy milk", "2%");
    alice_sink.wait_for("added: 1 Buy milk [PENDING] by alice").await;
    bob_sink.wait_for("added: 1 Buy milk [PENDING] by alice").await;

    bob.complete_task(1);
    alice_sink.wait_for("completed: 1 Buy milk by bob").await;
    bob_sink.wait_for("completed: 1 Buy milk by bob").await;

    bob.delete_task(1);
    alice_sink.wait_for("deleted: 1 Buy milk by bob").await;
}

#[tokio::test]
async fn late_client_sees_the_user_list_and_task_snapshot() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (alice, alice_sink) = connect_client(addr, "alice").await;
    alice.add_task("Ship it", "v1");
    alice_sink.wait_for("added: 1 Ship it [PENDING] by alice").await;

    let (_carol, carol_sink) = connect_client(addr, "carol").await;
    carol_sink.wait_for("users: alice,carol").await;
    carol_sink.wait_for("added: 1 Ship it [PENDING] by alice").await;
}

#[tokio::test]
async fn server_side_drop_fires_the_disconnected_callback_once() {
    // A bare listener that accepts one connection and hangs up.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _peer) = listener.accept().await.unwrap();
        sleep(Duration::from_millis(50)).await;
        drop(stream);
    });

    let sink = Arc::new(RecordingSink::default());
    let client = ProjectClient::new(&addr.to_string(), "alice", Arc::clone(&sink) as _);
    client.connect().await.expect("connect");

    sink.wait_for("disconnected: Connection closed by server")
        .await;
    assert!(!client.is_connected());
    assert_eq!(
        sink.snapshot()
            .iter()
            .filter(|l| l.starts_with("disconnected:"))
            .count(),
        1
    );
}

#[tokio::test]
async fn local_disconnect_is_silent_and_idempotent() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (alice, alice_sink) = connect_client(addr, "alice").await;

    alice.disconnect();
    alice.disconnect();
    sleep(Duration::from_millis(200)).await;

    assert!(!alice.is_connected());
    assert!(
        !alice_sink
            .snapshot()
            .iter()
            .any(|l| l.starts_with("disconnected:")),
        "local disconnect must not fire the callback"
    );

    // Commands after teardown are silent no-ops.
    alice.send_chat("into the void");
    alice.add_task("t", "d");
}

#[tokio::test]
async fn reconnect_after_local_disconnect_keeps_the_new_session_alive() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (alice, alice_sink) = connect_client(addr, "alice").await;

    alice.disconnect();
    // Let the server observe the EOF and free the username.
    sleep(Duration::from_millis(100)).await;

    alice.connect().await.expect("reconnect");
    alice_sink
        .wait_for_count("system: Welcome to the project, alice!", 2)
        .await;

    // Give the first connection's receive loop time to wind down; it must
    // not touch the second connection or fire the callback for a close the
    // caller asked for.
    sleep(Duration::from_millis(500)).await;
    assert!(alice.is_connected());
    assert!(
        !alice_sink
            .snapshot()
            .iter()
            .any(|l| l.starts_with("disconnected:")),
        "stale receive loop leaked into the new session: {:?}",
        alice_sink.snapshot()
    );

    // The new session is fully usable.
    alice.send_chat("back again");
    alice_sink.wait_for("chat: alice: back again").await;
}

#[tokio::test]
async fn rejected_username_can_retry_on_the_same_connection() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (_alice, _alice_sink) = connect_client(addr, "alice").await;

    let sink = Arc::new(RecordingSink::default());
    let client = ProjectClient::new(&addr.to_string(), "alice", Arc::clone(&sink) as _);
    client.connect().await.expect("connect");
    sink.wait_for("system: Username already taken. Please choose another:")
        .await;

    client.request_username("carol");
    sink.wait_for("system: Welcome to the project, carol!").await;
    sink.wait_for("users: alice,carol").await;
}
