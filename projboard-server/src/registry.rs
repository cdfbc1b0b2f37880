//! Shared session registry: the single store of live sessions, claimed
//! usernames, and the task table.
//!
//! All mutable server state lives behind one [`Mutex`], so the five mutating
//! operations (claim, add, complete, delete, register/unregister) serialize
//! with respect to each other: two concurrent task additions always receive
//! distinct ids and two concurrent completions of the same task cannot both
//! succeed. Broadcasts collect the recipient channel senders under the lock
//! and deliver after releasing it, so a slow or dead peer never stalls a
//! registry mutation. A failed channel send is ignored; the dead session's
//! own read loop discovers the disconnect and unregisters it.

use std::collections::{BTreeMap, HashMap};

use projboard_proto::task::Task;
use projboard_proto::wire::{self, ServerEvent};
use tokio::sync::{Mutex, mpsc};

/// Opaque handle identifying one live session inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Per-session bookkeeping: the outbound line channel and, once the join
/// handshake succeeds, the claimed username.
struct SessionEntry {
    sender: mpsc::UnboundedSender<String>,
    username: Option<String>,
}

/// State guarded by the registry lock.
struct RegistryInner {
    sessions: HashMap<SessionId, SessionEntry>,
    usernames: HashMap<String, SessionId>,
    tasks: BTreeMap<u64, Task>,
    next_task_id: u64,
    next_session_id: u64,
}

/// Process-wide shared state for one server instance.
///
/// Constructed once at server start and handed to every session via
/// `Arc<Registry>`; nothing here is a process-wide static, so tests can
/// spin up isolated registries freely.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry. Task ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                usernames: HashMap::new(),
                tasks: BTreeMap::new(),
                next_task_id: 1,
                next_session_id: 1,
            }),
        }
    }

    /// Adds a new session, returning its handle.
    ///
    /// The session is reachable by broadcasts from this point on, before its
    /// read loop starts, so it cannot miss events issued during its own setup.
    pub async fn register(&self, sender: mpsc::UnboundedSender<String>) -> SessionId {
        let mut inner = self.inner.lock().await;
        let id = SessionId(inner.next_session_id);
        inner.next_session_id += 1;
        inner.sessions.insert(
            id,
            SessionEntry {
                sender,
                username: None,
            },
        );
        tracing::debug!(session = %id, total = inner.sessions.len(), "session registered");
        id
    }

    /// Removes a session. Idempotent: a second call for the same id is a no-op.
    ///
    /// If the session had joined, its username is released and
    /// `SYSTEM:<name> left the project` is broadcast to the remaining
    /// sessions. A session that never joined departs silently.
    pub async fn unregister(&self, id: SessionId) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.sessions.remove(&id) else {
            return;
        };
        tracing::debug!(session = %id, total = inner.sessions.len(), "session unregistered");

        let Some(username) = entry.username else {
            return;
        };
        inner.usernames.remove(&username);
        let event = ServerEvent::System {
            text: format!("{username} left the project"),
        };
        let recipients = collect_senders(&inner, None);
        drop(inner);
        broadcast_event(&event, recipients);
    }

    /// Attempts to bind `name` to the given session.
    ///
    /// This is the sole identity-collision check in the system; bindings are
    /// not persisted and reset when the server restarts. On success the
    /// session becomes joined, `SYSTEM:<name> joined the project` is
    /// broadcast to every session (the claimer included), and the claimer's
    /// welcome line, user-list snapshot, and task-table snapshot are queued
    /// in the same locked section. Queuing the snapshot atomically with the
    /// claim guarantees a joiner sees the task table as of its join before
    /// any live broadcast; channel sends never block, so holding the lock
    /// across them cannot stall on a slow peer. On failure nothing changes
    /// and the caller should prompt for a different name.
    pub async fn claim_username(&self, id: SessionId, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.usernames.contains_key(name) {
            return false;
        }
        let Some(entry) = inner.sessions.get_mut(&id) else {
            // Session already torn down; nothing to bind.
            return false;
        };
        entry.username = Some(name.to_string());
        let claimer = entry.sender.clone();
        inner.usernames.insert(name.to_string(), id);
        tracing::info!(session = %id, username = %name, "username claimed");

        let joined = ServerEvent::System {
            text: format!("{name} joined the project"),
        };
        broadcast_event(&joined, collect_senders(&inner, None));

        let mut names: Vec<String> = inner.usernames.keys().cloned().collect();
        names.sort();
        let mut snapshot = vec![
            ServerEvent::System {
                text: format!("Welcome to the project, {name}!"),
            },
            ServerEvent::Users { usernames: names },
        ];
        snapshot.extend(inner.tasks.values().map(ServerEvent::task_added));
        for event in &snapshot {
            match wire::encode_event(event) {
                Ok(line) => {
                    let _ = claimer.send(line);
                }
                Err(e) => tracing::warn!(error = %e, "dropping unencodable snapshot line"),
            }
        }
        drop(inner);
        true
    }

    /// Returns a sorted snapshot copy of the currently joined usernames.
    pub async fn active_usernames(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner.usernames.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns an id-ordered snapshot copy of the task table.
    pub async fn tasks_snapshot(&self) -> Vec<Task> {
        let inner = self.inner.lock().await;
        inner.tasks.values().cloned().collect()
    }

    /// Creates a new pending task and broadcasts `TASK_ADDED` to every
    /// session, the creator included, so the creator's own view syncs
    /// through the same path as everyone else's. Returns the new id.
    pub async fn add_task(&self, title: &str, description: &str, creator: &str) -> u64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_task_id;
        inner.next_task_id += 1;
        let task = Task::new(
            id,
            title.to_string(),
            description.to_string(),
            creator.to_string(),
        );
        let event = ServerEvent::task_added(&task);
        inner.tasks.insert(id, task);
        tracing::info!(task = id, creator = %creator, title = %title, "task added");

        let recipients = collect_senders(&inner, None);
        drop(inner);
        broadcast_event(&event, recipients);
        id
    }

    /// Marks a task completed and broadcasts `TASK_COMPLETED`.
    ///
    /// Returns `false` with no broadcast if the task does not exist or is
    /// already completed. Both cases are deliberate no-ops rather than
    /// errors: two clients racing on a stale view must not crash either one,
    /// and the protocol does not distinguish "not found" from "wrong state".
    pub async fn complete_task(&self, id: u64, completer: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.tasks.get_mut(&id) else {
            return false;
        };
        if !task.complete(completer) {
            return false;
        }
        let event = ServerEvent::TaskCompleted {
            id,
            title: task.title.clone(),
            completed_by: completer.to_string(),
        };
        tracing::info!(task = id, completer = %completer, "task completed");

        let recipients = collect_senders(&inner, None);
        drop(inner);
        broadcast_event(&event, recipients);
        true
    }

    /// Removes a task regardless of its status and broadcasts `TASK_DELETED`.
    ///
    /// Returns `false` with no broadcast if the task does not exist. Deleted
    /// ids are never reused and never resurrected.
    pub async fn delete_task(&self, id: u64, deleter: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.tasks.remove(&id) else {
            return false;
        };
        let event = ServerEvent::TaskDeleted {
            id,
            title: task.title,
            deleted_by: deleter.to_string(),
        };
        tracing::info!(task = id, deleter = %deleter, "task deleted");

        let recipients = collect_senders(&inner, None);
        drop(inner);
        broadcast_event(&event, recipients);
        true
    }

    /// Sends a literal line to every registered session except `exclude`
    /// (pass `None` to exclude nobody).
    pub async fn broadcast(&self, line: &str, exclude: Option<SessionId>) {
        let inner = self.inner.lock().await;
        let recipients = collect_senders(&inner, exclude);
        drop(inner);
        fanout(line, recipients);
    }

    /// Sends a line to a single session, if it is still registered.
    pub async fn send_to(&self, id: SessionId, line: &str) {
        let inner = self.inner.lock().await;
        let sender = inner.sessions.get(&id).map(|e| e.sender.clone());
        drop(inner);
        if let Some(sender) = sender {
            let _ = sender.send(line.to_string());
        }
    }

    /// Number of currently registered sessions (joined or not).
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }
}

/// Clones the outbound senders of every session except `exclude`.
fn collect_senders(
    inner: &RegistryInner,
    exclude: Option<SessionId>,
) -> Vec<mpsc::UnboundedSender<String>> {
    inner
        .sessions
        .iter()
        .filter(|(id, _)| Some(**id) != exclude)
        .map(|(_, entry)| entry.sender.clone())
        .collect()
}

/// Encodes an event and delivers it to the collected recipients.
fn broadcast_event(event: &ServerEvent, recipients: Vec<mpsc::UnboundedSender<String>>) {
    match wire::encode_event(event) {
        Ok(line) => fanout(&line, recipients),
        Err(e) => tracing::warn!(error = %e, "dropping unencodable broadcast"),
    }
}

/// Delivers one line to each recipient channel; dead channels are skipped.
fn fanout(line: &str, recipients: Vec<mpsc::UnboundedSender<String>>) {
    for sender in recipients {
        let _ = sender.send(line.to_string());
    }
}
