//! Remote session: the client side of the project protocol.
//!
//! [`ProjectClient::connect`] opens the TCP stream, sends the `USERNAME:`
//! identification line, and spawns two background tasks: a writer draining
//! the outbound line channel, and a receive loop decoding inbound lines
//! into [`ProjectEvents`] callbacks. Outbound commands silently drop when
//! the session is not connected, mirroring the server's no-op-over-error
//! policy for actions against a closed resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use projboard_proto::wire::{self, ClientCommand, ServerEvent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::events::{ProjectEvents, TaskInfo};

/// Errors surfaced to the caller by [`ProjectClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The TCP connection could not be established. The client does not
    /// retry automatically.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The username cannot be framed as a wire line.
    #[error("username cannot be sent on the wire: {0}")]
    InvalidUsername(#[from] wire::WireError),

    /// `connect()` was called while a connection is already live.
    #[error("already connected")]
    AlreadyConnected,
}

/// State owned by one connection attempt.
///
/// Every `connect()` builds a fresh one, and the background tasks it spawns
/// hold clones of these flags only. A stale receive loop waking up after a
/// reconnect therefore flips its own generation's flags, never the live
/// connection's, and its `closing` check still reflects the `disconnect()`
/// that ended it.
struct Connection {
    sender: mpsc::UnboundedSender<String>,
    /// Gates outbound I/O; flipped off exactly once per connection by
    /// whichever of `disconnect()` or the receive loop gets there first.
    connected: Arc<AtomicBool>,
    /// Set by `disconnect()` so the receive loop knows the teardown was
    /// caller-initiated and suppresses the disconnected callback.
    closing: Arc<AtomicBool>,
}

impl Connection {
    fn is_live(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A client-side session with the project server.
///
/// All methods take `&self`; the client is safe to share behind an `Arc`
/// between a UI thread issuing commands and the background receive loop.
/// After a local `disconnect()` the same client can `connect()` again.
pub struct ProjectClient {
    server_addr: String,
    username: String,
    events: Arc<dyn ProjectEvents>,
    connection: parking_lot::Mutex<Option<Connection>>,
}

impl ProjectClient {
    /// Creates a client for the given server address and display name.
    ///
    /// The username is self-asserted; the server only checks it for
    /// session-local uniqueness during the join handshake.
    #[must_use]
    pub fn new(server_addr: &str, username: &str, events: Arc<dyn ProjectEvents>) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            username: username.to_string(),
            events,
            connection: parking_lot::Mutex::new(None),
        }
    }

    /// Opens the connection, identifies with `USERNAME:<name>`, and starts
    /// the background receive loop.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the socket cannot be opened,
    /// [`ClientError::InvalidUsername`] if the name cannot be framed, and
    /// [`ClientError::AlreadyConnected`] while a connection is live (also
    /// when two `connect()` calls race and another one won). There is no
    /// automatic retry.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.connection.lock().as_ref().is_some_and(Connection::is_live) {
            return Err(ClientError::AlreadyConnected);
        }
        let join_line = wire::encode_command(&ClientCommand::Join {
            username: self.username.clone(),
        })?;

        let stream = TcpStream::connect(&self.server_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.server_addr.clone(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let _ = tx.send(join_line);
        let connection = Connection {
            sender: tx,
            connected: Arc::new(AtomicBool::new(true)),
            closing: Arc::new(AtomicBool::new(false)),
        };
        let connected = Arc::clone(&connection.connected);
        let closing = Arc::clone(&connection.closing);

        {
            // Re-check after the await: a racing connect() may have won.
            // Returning here drops the split halves and closes the socket.
            let mut guard = self.connection.lock();
            if guard.as_ref().is_some_and(Connection::is_live) {
                return Err(ClientError::AlreadyConnected);
            }
            *guard = Some(connection);
        }

        tokio::spawn(write_loop(write_half, rx));
        tokio::spawn(receive_loop(
            read_half,
            Arc::clone(&self.events),
            connected,
            closing,
        ));

        tracing::info!(addr = %self.server_addr, username = %self.username, "connected to project server");
        Ok(())
    }

    /// Whether the session is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.lock().as_ref().is_some_and(Connection::is_live)
    }

    /// Posts a chat message. No-op when disconnected.
    pub fn send_chat(&self, text: &str) {
        self.send_command(&ClientCommand::Chat {
            text: text.to_string(),
        });
    }

    /// Creates a task. No-op when disconnected.
    pub fn add_task(&self, title: &str, description: &str) {
        self.send_command(&ClientCommand::AddTask {
            title: title.to_string(),
            description: description.to_string(),
        });
    }

    /// Marks a task completed. No-op when disconnected.
    pub fn complete_task(&self, id: u64) {
        self.send_command(&ClientCommand::CompleteTask { id });
    }

    /// Deletes a task. No-op when disconnected.
    pub fn delete_task(&self, id: u64) {
        self.send_command(&ClientCommand::DeleteTask { id });
    }

    /// Requests a different username after a rejection, while the server
    /// still has this session in its pre-join state. No-op when
    /// disconnected.
    pub fn request_username(&self, username: &str) {
        self.send_command(&ClientCommand::Join {
            username: username.to_string(),
        });
    }

    /// Tears the current connection down. Idempotent, callable from any
    /// thread; the disconnected callback does not fire for a local
    /// disconnect, and a later `connect()` starts a fresh connection that
    /// no leftover loop from this one can touch.
    pub fn disconnect(&self) {
        let Some(connection) = self.connection.lock().take() else {
            return;
        };
        connection.closing.store(true, Ordering::SeqCst);
        if connection.connected.swap(false, Ordering::SeqCst) {
            tracing::info!(addr = %self.server_addr, "disconnecting");
        }
        // Dropping the sender ends the writer task, which releases the
        // write half; the server observes EOF and cleans up.
    }

    /// Encodes and queues a command, silently dropping it when the session
    /// is closed or the command cannot be framed.
    fn send_command(&self, command: &ClientCommand) {
        match wire::encode_command(command) {
            Ok(line) => {
                let guard = self.connection.lock();
                match guard.as_ref() {
                    Some(connection) if connection.is_live() => {
                        let _ = connection.sender.send(line);
                    }
                    _ => {
                        tracing::debug!(command = ?command, "dropping command while disconnected");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "dropping unencodable command"),
        }
    }
}

impl Drop for ProjectClient {
    fn drop(&mut self) {
        self.disconnect();
    }
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

/// Background receive loop: decodes inbound lines into event callbacks.
///
/// Ends on EOF or a read error. The flags belong to this loop's own
/// connection, so a delayed EOF observed after a reconnect cannot mark the
/// successor connection disconnected. The disconnected callback fires only
/// when the connection was still marked connected (i.e. the teardown was
/// not caller-initiated), and at most once thanks to the atomic swap.
async fn receive_loop(
    read_half: OwnedReadHalf,
    events: Arc<dyn ProjectEvents>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    let reason = loop {
        match lines.next_line().await {
            Ok(Some(line)) => match wire::decode_event(&line) {
                Ok(event) => dispatch(events.as_ref(), event),
                Err(e) => tracing::debug!(error = %e, "unrecognized server line ignored"),
            },
            Ok(None) => break "Connection closed by server".to_string(),
            Err(e) => break format!("Connection lost: {e}"),
        }
    };

    let was_connected = connected.swap(false, Ordering::SeqCst);
    if was_connected && !closing.load(Ordering::SeqCst) {
        tracing::warn!(reason = %reason, "receive loop ended");
        events.on_disconnected(&reason);
    }
}

/// Routes one decoded server event to its sink callback.
fn dispatch(events: &dyn ProjectEvents, event: ServerEvent) {
    match event {
        ServerEvent::System { text } => events.on_system_message(&text),
        ServerEvent::Chat { username, text } => events.on_chat_message(&username, &text),
        ServerEvent::Users { usernames } => events.on_users_updated(&usernames),
        ServerEvent::TaskAdded {
            id,
            title,
            description,
            assigned_by,
            status,
            completed_by,
        } => events.on_task_added(&TaskInfo {
            id,
            title,
            description,
            assigned_by,
            status,
            completed_by,
        }),
        ServerEvent::TaskCompleted {
            id,
            title,
            completed_by,
        } => events.on_task_completed(id, &title, &completed_by),
        ServerEvent::TaskDeleted {
            id,
            title,
            deleted_by,
        } => events.on_task_deleted(id, &title, &deleted_by),
    }
}
