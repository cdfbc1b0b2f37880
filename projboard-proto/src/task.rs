//! Task data model shared between server and client.
//!
//! A task is an immutable identity (id, title, description, creator) plus a
//! mutable status record. Status moves from [`TaskStatus::Pending`] to
//! [`TaskStatus::Completed`] exactly once and never reverts; the completer
//! and completion time are recorded on that transition and at no other point.

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Status of a task on the shared board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task has been created and not yet completed.
    Pending,
    /// Task has been completed; the transition is one-way.
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Error returned when a status field on the wire is not a known status.
#[derive(Debug, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One unit of work on the shared board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Unique positive id, assigned by the server registry, never reused.
    pub id: u64,
    /// Creator-supplied title, immutable after creation.
    pub title: String,
    /// Creator-supplied description, immutable after creation.
    pub description: String,
    /// Username of the creator, immutable.
    pub assigned_by: String,
    /// Current status; starts [`TaskStatus::Pending`].
    pub status: TaskStatus,
    /// Username of the completer, set only on the Pending -> Completed transition.
    pub completed_by: Option<String>,
    /// When the task was created.
    pub created_at: Timestamp,
    /// When the task was completed; `None` while pending.
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Creates a new pending task with the given identity fields.
    #[must_use]
    pub fn new(id: u64, title: String, description: String, assigned_by: String) -> Self {
        Self {
            id,
            title,
            description,
            assigned_by,
            status: TaskStatus::Pending,
            completed_by: None,
            created_at: Timestamp::now(),
            completed_at: None,
        }
    }

    /// Returns `true` if the task has not been completed yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Performs the one-way Pending -> Completed transition.
    ///
    /// Returns `false` without touching the task if it is already completed,
    /// so a second completion attempt is a no-op rather than an overwrite.
    pub fn complete(&mut self, completed_by: &str) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_by = Some(completed_by.to_string());
        self.completed_at = Some(Timestamp::now());
        true
    }
}
