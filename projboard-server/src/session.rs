//! Per-connection session loop.
//!
//! A session moves through `AwaitingUsername -> Joined -> Closed`. Before
//! joining, only `USERNAME:` lines are acted on; everything else is ignored.
//! Once joined, inbound lines are decoded by the shared codec and dispatched
//! to the [`Registry`]. Protocol violations are logged and skipped; only
//! EOF or an I/O error closes the session, and closing always unregisters
//! exactly once.

use std::sync::Arc;

use projboard_proto::wire::{self, ClientCommand, ServerEvent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::registry::{Registry, SessionId};

/// Rejection line for a taken or unusable username. Clients key their
/// retry prompt off this exact text, so it must not change.
const USERNAME_REJECTED: &str = "SYSTEM:Username already taken. Please choose another:";

/// Drives one accepted connection to completion.
///
/// Registers the session (so it is reachable by broadcasts before its read
/// loop starts), spawns the writer task, runs the join handshake and then
/// the joined dispatch loop, and unregisters on the way out. The writer
/// task drains whatever is still queued once the registry drops its sender.
pub async fn handle_connection(stream: TcpStream, registry: Arc<Registry>) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    let id = registry.register(tx).await;
    tracing::info!(session = %id, peer = %peer, "connection accepted");

    let write_task = tokio::spawn(write_loop(write_half, rx));
    let mut lines = BufReader::new(read_half).lines();

    if let Some(username) = run_handshake(&mut lines, &registry, id).await {
        run_joined_loop(&mut lines, &registry, id, &username).await;
        tracing::info!(session = %id, username = %username, "session closed");
    } else {
        // Closed before joining: nothing to announce.
        tracing::info!(session = %id, "connection closed before join");
    }

    registry.unregister(id).await;
    let _ = write_task.await;
}

/// Writer task: forwards queued lines to the socket until the channel
/// closes or a write fails.
async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if write_half
            .write_all(format!("{line}\n").as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

/// `AwaitingUsername` state: reads lines until a join attempt succeeds.
///
/// Returns the claimed username, or `None` if the connection closed first.
/// A taken or unusable name gets the rejection line and another try; any
/// non-join line is ignored.
async fn run_handshake(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    registry: &Registry,
    id: SessionId,
) -> Option<String> {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "read error before join");
                return None;
            }
        };
        match wire::decode_command(&line) {
            Ok(ClientCommand::Join { username }) => {
                if !is_valid_username(&username) {
                    tracing::debug!(session = %id, username = %username, "unusable username rejected");
                    registry.send_to(id, USERNAME_REJECTED).await;
                    continue;
                }
                if registry.claim_username(id, &username).await {
                    return Some(username);
                }
                tracing::debug!(session = %id, username = %username, "username already taken");
                registry.send_to(id, USERNAME_REJECTED).await;
            }
            Ok(other) => {
                tracing::debug!(session = %id, command = ?other, "command before join ignored");
            }
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "unparsable line before join ignored");
            }
        }
    }
}

/// `Joined` state: decodes and dispatches lines until the peer goes away.
async fn run_joined_loop(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    registry: &Registry,
    id: SessionId,
    username: &str,
) {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "read error, closing session");
                return;
            }
        };
        match wire::decode_command(&line) {
            Ok(ClientCommand::Chat { text }) => {
                let event = ServerEvent::Chat {
                    username: username.to_string(),
                    text,
                };
                match wire::encode_event(&event) {
                    // Nobody is excluded from chat; the sender sees its own
                    // line come back like everyone else.
                    Ok(line) => registry.broadcast(&line, None).await,
                    Err(e) => tracing::warn!(session = %id, error = %e, "dropping unencodable chat"),
                }
            }
            Ok(ClientCommand::AddTask { title, description }) => {
                let task_id = registry.add_task(&title, &description, username).await;
                tracing::debug!(session = %id, task = task_id, "task added by session");
            }
            Ok(ClientCommand::CompleteTask { id: task_id }) => {
                if !registry.complete_task(task_id, username).await {
                    tracing::debug!(session = %id, task = task_id, "complete was a no-op");
                }
            }
            Ok(ClientCommand::DeleteTask { id: task_id }) => {
                if !registry.delete_task(task_id, username).await {
                    tracing::debug!(session = %id, task = task_id, "delete was a no-op");
                }
            }
            Ok(ClientCommand::Join { .. }) => {
                tracing::debug!(session = %id, "join attempt after joining ignored");
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "protocol violation ignored");
            }
        }
    }
}

/// A username must be non-empty and free of the characters that would
/// corrupt the `USERS:` csv, a `|`-separated payload, or the
/// `MESSAGE:<username>: ` chat prefix.
fn is_valid_username(name: &str) -> bool {
    !name.is_empty() && !name.contains(['|', ',']) && !name.contains(": ")
}
