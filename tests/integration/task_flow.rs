//! Integration tests for the shared task table: add/complete/delete
//! broadcasts, stale-view races as silent no-ops, id allocation, and the
//! join-time task snapshot.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use projboard_server::server::start_server;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

type Reader = Lines<BufReader<OwnedReadHalf>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

async fn connect(addr: std::net::SocketAddr) -> (Reader, OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half).lines(), write_half)
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) {
    writer
        .write_all(format!("{line}\n").as_bytes())
        .await
        .expect("send line");
}

async fn recv(reader: &mut Reader) -> String {
    timeout(RECV_TIMEOUT, reader.next_line())
        .await
        .expect("timed out waiting for a line")
        .expect("read error")
        .expect("unexpected EOF")
}

async fn recv_until(reader: &mut Reader, wanted: &str) {
    loop {
        if recv(reader).await == wanted {
            return;
        }
    }
}

async fn expect_silence(reader: &mut Reader) {
    let result = timeout(SILENCE_WINDOW, reader.next_line()).await;
    assert!(
        result.is_err(),
        "expected silence, got {:?}",
        result.unwrap()
    );
}

/// Joins and consumes the whole welcome sequence (no task lines expected).
async fn join(addr: std::net::SocketAddr, username: &str) -> (Reader, OwnedWriteHalf) {
    let (mut reader, mut writer) = connect(addr).await;
    send(&mut writer, &format!("USERNAME:{username}")).await;
    recv_until(&mut reader, &format!("SYSTEM:Welcome to the project, {username}!")).await;
    let users = recv(&mut reader).await;
    assert!(users.starts_with("USERS:"), "expected USERS line, got {users}");
    (reader, writer)
}

#[tokio::test]
async fn add_and_complete_broadcast_to_everyone_once() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (mut alice_reader, mut alice_writer) = join(addr, "alice").await;
    let (mut bob_reader, mut bob_writer) = join(addr, "bob").await;
    // Alice sees bob's arrival too.
    recv_until(&mut alice_reader, "SYSTEM:bob joined the project").await;

    // Alice adds a task; both peers, the creator included, get the broadcast.
    send(&mut alice_writer, "ADD_TASK:Buy milk|2%").await;
    assert_eq!(
        recv(&mut alice_reader).await,
        "TASK_ADDED:1|Buy milk|2%|alice|PENDING|"
    );
    assert_eq!(
        recv(&mut bob_reader).await,
        "TASK_ADDED:1|Buy milk|2%|alice|PENDING|"
    );

    // Bob completes it; both get the completion.
    send(&mut bob_writer, "COMPLETE_TASK:1").await;
    assert_eq!(recv(&mut alice_reader).await, "TASK_COMPLETED:1|Buy milk|bob");
    assert_eq!(recv(&mut bob_reader).await, "TASK_COMPLETED:1|Buy milk|bob");

    // A second completion from a stale view is a silent no-op.
    send(&mut alice_writer, "COMPLETE_TASK:1").await;
    expect_silence(&mut alice_reader).await;
    expect_silence(&mut bob_reader).await;
}

#[tokio::test]
async fn delete_broadcasts_and_the_id_stays_dead() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (mut alice_reader, mut alice_writer) = join(addr, "alice").await;

    send(&mut alice_writer, "ADD_TASK:Old chore|meh").await;
    assert_eq!(
        recv(&mut alice_reader).await,
        "TASK_ADDED:1|Old chore|meh|alice|PENDING|"
    );

    send(&mut alice_writer, "DELETE_TASK:1").await;
    assert_eq!(recv(&mut alice_reader).await, "TASK_DELETED:1|Old chore|alice");

    // Anything referencing the deleted id fails silently.
    send(&mut alice_writer, "COMPLETE_TASK:1").await;
    send(&mut alice_writer, "DELETE_TASK:1").await;
    expect_silence(&mut alice_reader).await;

    // And the id is never reused.
    send(&mut alice_writer, "ADD_TASK:New chore|yep").await;
    assert_eq!(
        recv(&mut alice_reader).await,
        "TASK_ADDED:2|New chore|yep|alice|PENDING|"
    );
}

#[tokio::test]
async fn completed_tasks_can_still_be_deleted() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (mut alice_reader, mut alice_writer) = join(addr, "alice").await;

    send(&mut alice_writer, "ADD_TASK:Ship it|v1").await;
    recv_until(&mut alice_reader, "TASK_ADDED:1|Ship it|v1|alice|PENDING|").await;
    send(&mut alice_writer, "COMPLETE_TASK:1").await;
    recv_until(&mut alice_reader, "TASK_COMPLETED:1|Ship it|alice").await;

    send(&mut alice_writer, "DELETE_TASK:1").await;
    assert_eq!(recv(&mut alice_reader).await, "TASK_DELETED:1|Ship it|alice");
}

#[tokio::test]
async fn late_joiner_receives_the_task_snapshot_with_current_status() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (mut alice_reader, mut alice_writer) = join(addr, "alice").await;

    send(&mut alice_writer, "ADD_TASK:Buy milk|2%").await;
    send(&mut alice_writer, "ADD_TASK:Ship it|v1").await;
    send(&mut alice_writer, "COMPLETE_TASK:1").await;
    recv_until(&mut alice_reader, "TASK_COMPLETED:1|Buy milk|alice").await;

    // Carol joins after the fact and gets exactly the current table,
    // completer included, before anything live.
    let (mut carol_reader, mut carol_writer) = connect(addr).await;
    send(&mut carol_writer, "USERNAME:carol").await;
    recv_until(&mut carol_reader, "SYSTEM:Welcome to the project, carol!").await;
    assert_eq!(recv(&mut carol_reader).await, "USERS:alice,carol");
    assert_eq!(
        recv(&mut carol_reader).await,
        "TASK_ADDED:1|Buy milk|2%|alice|COMPLETED|alice"
    );
    assert_eq!(
        recv(&mut carol_reader).await,
        "TASK_ADDED:2|Ship it|v1|alice|PENDING|"
    );
    expect_silence(&mut carol_reader).await;
}

#[tokio::test]
async fn malformed_task_lines_are_ignored_and_the_session_survives() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let (mut alice_reader, mut alice_writer) = join(addr, "alice").await;

    send(&mut alice_writer, "COMPLETE_TASK:not-a-number").await;
    send(&mut alice_writer, "DELETE_TASK:").await;
    send(&mut alice_writer, "ADD_TASK:missing-separator").await;
    send(&mut alice_writer, "ADD_TASK:too|many|fields").await;
    send(&mut alice_writer, "UNKNOWN_TAG:whatever").await;
    expect_silence(&mut alice_reader).await;

    // The read loop kept going; a well-formed command still works.
    send(&mut alice_writer, "ADD_TASK:Buy milk|2%").await;
    assert_eq!(
        recv(&mut alice_reader).await,
        "TASK_ADDED:1|Buy milk|2%|alice|PENDING|"
    );
}
