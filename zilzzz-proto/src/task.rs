//! Reminder task model shared by the client engine and the store server.
//!
//! Field names follow the store's document shape (`ownerId`, `dueDate`,
//! `createdAt`). `dueDate` travels as an ISO-8601 timestamp string and
//! `createdAt` as integer milliseconds since the Unix epoch.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task text length in characters.
pub const MAX_TASK_TEXT_LENGTH: usize = 500;

/// Store-assigned task identifier, based on UUID v7 so ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Mints a fresh, time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identity of the user who owns a set of tasks.
///
/// Opaque to the engine: it is whatever the identity provider hands out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this owner id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is empty or whitespace-only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How often a reminder repeats after its first due date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    /// Fires once.
    #[default]
    None,
    /// Fires every day at the due time-of-day.
    Daily,
    /// Fires every week at the due time-of-day.
    Weekly,
}

impl Repeat {
    /// Returns the wire/settings name of this repeat mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Returns `true` for the recurring modes.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown repeat mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown repeat mode: {0} (expected none, daily or weekly)")]
pub struct ParseRepeatError(String);

impl FromStr for Repeat {
    type Err = ParseRepeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            _ => Err(ParseRepeatError(s.to_string())),
        }
    }
}

/// A reminder task as held by the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// What to be reminded of. Never blank.
    pub text: String,
    /// Owner of this task; fixed at creation.
    pub owner_id: OwnerId,
    /// When the reminder is due.
    pub due_date: DateTime<Utc>,
    /// Repeat cadence; absent in older records, read as [`Repeat::None`].
    #[serde(default)]
    pub repeat: Repeat,
    /// Whether the task has been ticked off.
    #[serde(default)]
    pub completed: bool,
    /// Creation time in milliseconds since epoch; fixed at creation.
    pub created_at: u64,
}

/// Every field of a new task except the id, which the store assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    /// Task text.
    pub text: String,
    /// Owner the task is created for.
    pub owner_id: OwnerId,
    /// Due instant.
    pub due_date: DateTime<Utc>,
    /// Repeat cadence.
    pub repeat: Repeat,
    /// Initial completion flag (always `false` from the client).
    pub completed: bool,
    /// Creation time in milliseconds since epoch.
    pub created_at: u64,
}

impl TaskFields {
    /// Attaches a store-assigned id, producing the stored record.
    #[must_use]
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            text: self.text,
            owner_id: self.owner_id,
            due_date: self.due_date,
            repeat: self.repeat,
            completed: self.completed,
            created_at: self.created_at,
        }
    }
}

/// A partial update. Only present fields are written.
///
/// There is deliberately no way to express a change to `id`, `owner_id`
/// or `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New text, if changing.
    pub text: Option<String>,
    /// New due instant, if changing.
    pub due_date: Option<DateTime<Utc>>,
    /// New repeat cadence, if changing.
    pub repeat: Option<Repeat>,
    /// New completion flag, if changing.
    pub completed: Option<bool>,
}

impl TaskPatch {
    /// Patch written by an edit commit: text, due date and repeat only.
    #[must_use]
    pub const fn edit(text: String, due_date: DateTime<Utc>, repeat: Repeat) -> Self {
        Self {
            text: Some(text),
            due_date: Some(due_date),
            repeat: Some(repeat),
            completed: None,
        }
    }

    /// Patch written by a completion toggle.
    #[must_use]
    pub const fn completion(completed: bool) -> Self {
        Self {
            text: None,
            due_date: None,
            repeat: None,
            completed: Some(completed),
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.due_date.is_none()
            && self.repeat.is_none()
            && self.completed.is_none()
    }

    /// Writes the present fields into `task`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(text) = &self.text {
            task.text.clone_from(text);
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(repeat) = self.repeat {
            task.repeat = repeat;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

/// One feed event: the complete current set of records for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// Every record visible to the subscriber, in store order.
    pub items: Vec<T>,
}

impl<T> Snapshot<T> {
    /// Wraps a full record set.
    #[must_use]
    pub const fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Number of records in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
