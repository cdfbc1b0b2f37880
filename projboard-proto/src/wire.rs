//! Line codec for the Projboard wire protocol.
//!
//! Every message is a single newline-terminated UTF-8 line of the form
//! `TAG:payload`, with `|` separating fields inside a payload. Client and
//! server both encode and decode through this module so the wire format
//! lives in exactly one place.
//!
//! Decoding is strict about field counts and id syntax; callers treat a
//! [`WireError`] as a protocol violation to log and skip, never as a reason
//! to drop the connection.

use std::str::FromStr;

use crate::task::{Task, TaskStatus};

/// Errors produced when encoding or decoding a protocol line.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The line does not start with any known `TAG:` prefix.
    #[error("unknown tag in line: {0:?}")]
    UnknownTag(String),

    /// A recognized tag carried a payload with the wrong shape.
    #[error("malformed {tag} payload: {reason}")]
    MalformedPayload {
        /// The tag whose payload failed to parse.
        tag: &'static str,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A task id field was not a positive integer.
    #[error("invalid task id: {0:?}")]
    InvalidTaskId(String),

    /// An outgoing field contained a byte that would corrupt line framing
    /// or field separation.
    #[error("illegal character {found:?} in outgoing {field}")]
    IllegalCharacter {
        /// The offending character.
        found: char,
        /// The field it was found in.
        field: &'static str,
    },
}

/// A line sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `USERNAME:<name>` — the join handshake.
    Join {
        /// Requested display name.
        username: String,
    },
    /// `MESSAGE:<text>` — post a chat message.
    Chat {
        /// Raw chat text; the server prepends the sender's username.
        text: String,
    },
    /// `ADD_TASK:<title>|<description>` — create a task.
    AddTask {
        /// Task title.
        title: String,
        /// Task description.
        description: String,
    },
    /// `COMPLETE_TASK:<id>` — mark a task completed.
    CompleteTask {
        /// Id of the task to complete.
        id: u64,
    },
    /// `DELETE_TASK:<id>` — remove a task.
    DeleteTask {
        /// Id of the task to delete.
        id: u64,
    },
}

/// A line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// `SYSTEM:<text>` — informational notice.
    System {
        /// Notice text.
        text: String,
    },
    /// `MESSAGE:<username>: <text>` — broadcast chat message.
    Chat {
        /// Username of the sender.
        username: String,
        /// Chat text.
        text: String,
    },
    /// `USERS:<csv>` — full user-list snapshot; empty csv means zero users.
    Users {
        /// All currently joined usernames.
        usernames: Vec<String>,
    },
    /// `TASK_ADDED:<id>|<title>|<description>|<assignedBy>|<status>|<completedBy-or-empty>`
    ///
    /// Sent both as a live broadcast on creation and, one line per task,
    /// as the task-table snapshot delivered to a newly joined session.
    TaskAdded {
        /// Task id.
        id: u64,
        /// Task title.
        title: String,
        /// Task description.
        description: String,
        /// Username of the creator.
        assigned_by: String,
        /// Current status.
        status: TaskStatus,
        /// Completer, if the task is already completed.
        completed_by: Option<String>,
    },
    /// `TASK_COMPLETED:<id>|<title>|<completedBy>`
    TaskCompleted {
        /// Task id.
        id: u64,
        /// Task title.
        title: String,
        /// Username of the completer.
        completed_by: String,
    },
    /// `TASK_DELETED:<id>|<title>|<deletedBy>`
    TaskDeleted {
        /// Task id.
        id: u64,
        /// Task title.
        title: String,
        /// Username of the deleter.
        deleted_by: String,
    },
}

impl ServerEvent {
    /// Builds the `TaskAdded` event for a task's current state.
    ///
    /// Used both for the creation broadcast and for snapshot lines, so a
    /// late joiner sees completed tasks with their completer filled in.
    #[must_use]
    pub fn task_added(task: &Task) -> Self {
        Self::TaskAdded {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            assigned_by: task.assigned_by.clone(),
            status: task.status,
            completed_by: task.completed_by.clone(),
        }
    }
}

/// Rejects fields that would corrupt line framing.
fn check_no_newline(value: &str, field: &'static str) -> Result<(), WireError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(WireError::IllegalCharacter { found: '\n', field });
    }
    Ok(())
}

/// Rejects fields that would shift `|`-separated payloads.
fn check_no_separator(value: &str, field: &'static str) -> Result<(), WireError> {
    check_no_newline(value, field)?;
    if value.contains('|') {
        return Err(WireError::IllegalCharacter { found: '|', field });
    }
    Ok(())
}

/// Encodes a client command into a wire line (without the trailing newline).
///
/// # Errors
///
/// Returns [`WireError::IllegalCharacter`] if a field contains a newline, or
/// a `|` where it would break field separation.
pub fn encode_command(command: &ClientCommand) -> Result<String, WireError> {
    match command {
        ClientCommand::Join { username } => {
            check_no_newline(username, "username")?;
            Ok(format!("USERNAME:{username}"))
        }
        ClientCommand::Chat { text } => {
            check_no_newline(text, "chat text")?;
            Ok(format!("MESSAGE:{text}"))
        }
        ClientCommand::AddTask { title, description } => {
            check_no_separator(title, "task title")?;
            check_no_separator(description, "task description")?;
            Ok(format!("ADD_TASK:{title}|{description}"))
        }
        ClientCommand::CompleteTask { id } => Ok(format!("COMPLETE_TASK:{id}")),
        ClientCommand::DeleteTask { id } => Ok(format!("DELETE_TASK:{id}")),
    }
}

/// Decodes one inbound line on the server into a [`ClientCommand`].
///
/// # Errors
///
/// Returns [`WireError::UnknownTag`] for unrecognized lines,
/// [`WireError::MalformedPayload`] for wrong field counts, and
/// [`WireError::InvalidTaskId`] for non-numeric ids.
pub fn decode_command(line: &str) -> Result<ClientCommand, WireError> {
    if let Some(username) = line.strip_prefix("USERNAME:") {
        return Ok(ClientCommand::Join {
            username: username.to_string(),
        });
    }
    if let Some(text) = line.strip_prefix("MESSAGE:") {
        return Ok(ClientCommand::Chat {
            text: text.to_string(),
        });
    }
    if let Some(payload) = line.strip_prefix("ADD_TASK:") {
        let fields: Vec<&str> = payload.split('|').collect();
        let [title, description] = fields[..] else {
            return Err(WireError::MalformedPayload {
                tag: "ADD_TASK",
                reason: format!("expected 2 fields, got {}", fields.len()),
            });
        };
        return Ok(ClientCommand::AddTask {
            title: title.to_string(),
            description: description.to_string(),
        });
    }
    if let Some(id) = line.strip_prefix("COMPLETE_TASK:") {
        return Ok(ClientCommand::CompleteTask {
            id: parse_task_id(id)?,
        });
    }
    if let Some(id) = line.strip_prefix("DELETE_TASK:") {
        return Ok(ClientCommand::DeleteTask {
            id: parse_task_id(id)?,
        });
    }
    Err(WireError::UnknownTag(line.to_string()))
}

/// Encodes a server event into a wire line (without the trailing newline).
///
/// # Errors
///
/// Returns [`WireError::IllegalCharacter`] if a field contains a newline, a
/// `|` inside a `|`-separated payload, or a `,` inside a `USERS:` name.
pub fn encode_event(event: &ServerEvent) -> Result<String, WireError> {
    match event {
        ServerEvent::System { text } => {
            check_no_newline(text, "system text")?;
            Ok(format!("SYSTEM:{text}"))
        }
        ServerEvent::Chat { username, text } => {
            check_no_newline(username, "username")?;
            check_no_newline(text, "chat text")?;
            Ok(format!("MESSAGE:{username}: {text}"))
        }
        ServerEvent::Users { usernames } => {
            for name in usernames {
                check_no_newline(name, "username")?;
                if name.contains(',') {
                    return Err(WireError::IllegalCharacter {
                        found: ',',
                        field: "username",
                    });
                }
            }
            Ok(format!("USERS:{}", usernames.join(",")))
        }
        ServerEvent::TaskAdded {
            id,
            title,
            description,
            assigned_by,
            status,
            completed_by,
        } => {
            check_no_separator(title, "task title")?;
            check_no_separator(description, "task description")?;
            check_no_separator(assigned_by, "username")?;
            let completed_by = completed_by.as_deref().unwrap_or("");
            check_no_separator(completed_by, "username")?;
            Ok(format!(
                "TASK_ADDED:{id}|{title}|{description}|{assigned_by}|{status}|{completed_by}"
            ))
        }
        ServerEvent::TaskCompleted {
            id,
            title,
            completed_by,
        } => {
            check_no_separator(title, "task title")?;
            check_no_separator(completed_by, "username")?;
            Ok(format!("TASK_COMPLETED:{id}|{title}|{completed_by}"))
        }
        ServerEvent::TaskDeleted {
            id,
            title,
            deleted_by,
        } => {
            check_no_separator(title, "task title")?;
            check_no_separator(deleted_by, "username")?;
            Ok(format!("TASK_DELETED:{id}|{title}|{deleted_by}"))
        }
    }
}

/// Decodes one inbound line on the client into a [`ServerEvent`].
///
/// # Errors
///
/// Returns [`WireError::UnknownTag`] for unrecognized lines,
/// [`WireError::MalformedPayload`] for wrong field counts or a bad status,
/// and [`WireError::InvalidTaskId`] for non-numeric ids.
pub fn decode_event(line: &str) -> Result<ServerEvent, WireError> {
    if let Some(text) = line.strip_prefix("SYSTEM:") {
        return Ok(ServerEvent::System {
            text: text.to_string(),
        });
    }
    if let Some(payload) = line.strip_prefix("MESSAGE:") {
        let Some((username, text)) = payload.split_once(": ") else {
            return Err(WireError::MalformedPayload {
                tag: "MESSAGE",
                reason: "missing `username: ` prefix".to_string(),
            });
        };
        return Ok(ServerEvent::Chat {
            username: username.to_string(),
            text: text.to_string(),
        });
    }
    if let Some(csv) = line.strip_prefix("USERS:") {
        let usernames = if csv.is_empty() {
            Vec::new()
        } else {
            csv.split(',').map(String::from).collect()
        };
        return Ok(ServerEvent::Users { usernames });
    }
    if let Some(payload) = line.strip_prefix("TASK_ADDED:") {
        let fields: Vec<&str> = payload.split('|').collect();
        let [id, title, description, assigned_by, status, completed_by] = fields[..] else {
            return Err(WireError::MalformedPayload {
                tag: "TASK_ADDED",
                reason: format!("expected 6 fields, got {}", fields.len()),
            });
        };
        let status = TaskStatus::from_str(status).map_err(|e| WireError::MalformedPayload {
            tag: "TASK_ADDED",
            reason: e.to_string(),
        })?;
        return Ok(ServerEvent::TaskAdded {
            id: parse_task_id(id)?,
            title: title.to_string(),
            description: description.to_string(),
            assigned_by: assigned_by.to_string(),
            status,
            completed_by: if completed_by.is_empty() {
                None
            } else {
                Some(completed_by.to_string())
            },
        });
    }
    if let Some(payload) = line.strip_prefix("TASK_COMPLETED:") {
        let fields: Vec<&str> = payload.split('|').collect();
        let [id, title, completed_by] = fields[..] else {
            return Err(WireError::MalformedPayload {
                tag: "TASK_COMPLETED",
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        };
        return Ok(ServerEvent::TaskCompleted {
            id: parse_task_id(id)?,
            title: title.to_string(),
            completed_by: completed_by.to_string(),
        });
    }
    if let Some(payload) = line.strip_prefix("TASK_DELETED:") {
        let fields: Vec<&str> = payload.split('|').collect();
        let [id, title, deleted_by] = fields[..] else {
            return Err(WireError::MalformedPayload {
                tag: "TASK_DELETED",
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        };
        return Ok(ServerEvent::TaskDeleted {
            id: parse_task_id(id)?,
            title: title.to_string(),
            deleted_by: deleted_by.to_string(),
        });
    }
    Err(WireError::UnknownTag(line.to_string()))
}

/// Parses a task id field, rejecting zero (ids start at 1).
fn parse_task_id(field: &str) -> Result<u64, WireError> {
    match field.parse::<u64>() {
        Ok(0) | Err(_) => Err(WireError::InvalidTaskId(field.to_string())),
        Ok(id) => Ok(id),
    }
}
