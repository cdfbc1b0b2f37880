//! The event-sink boundary between the receive loop and the caller's UI.

use projboard_proto::task::TaskStatus;

/// A task as announced by the server, either as a live `TASK_ADDED`
/// broadcast or as one line of the join-time task-table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Server-assigned task id.
    pub id: u64,
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Username of the creator.
    pub assigned_by: String,
    /// Status at the time of the announcement.
    pub status: TaskStatus,
    /// Completer, if the task was already completed.
    pub completed_by: Option<String>,
}

/// Callbacks invoked by the client's background receive loop.
///
/// Implementations render state for the user; they must be cheap or
/// hand off to their own executor, since they run on the receive loop.
/// The loop delivers events in the order the server sent them.
pub trait ProjectEvents: Send + Sync {
    /// An informational `SYSTEM:` notice (joins, departures, rejections).
    fn on_system_message(&self, text: &str);

    /// A chat message broadcast from `username`.
    fn on_chat_message(&self, username: &str, text: &str);

    /// A full snapshot of the currently joined usernames; empty means
    /// zero users.
    fn on_users_updated(&self, usernames: &[String]);

    /// A task was added, or replayed as part of the join snapshot.
    fn on_task_added(&self, task: &TaskInfo);

    /// A task was completed.
    fn on_task_completed(&self, id: u64, title: &str, completed_by: &str);

    /// A task was deleted.
    fn on_task_deleted(&self, id: u64, title: &str, deleted_by: &str);

    /// The connection was lost for a reason other than a local
    /// `disconnect()` call. Fired at most once per connection.
    fn on_disconnected(&self, reason: &str);
}
