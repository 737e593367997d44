//! Edit session: the draft behind "add reminder" and "edit reminder".
//!
//! A draft only changes local state. Nothing reaches the store until the
//! controller commits it.

use chrono::{DateTime, Utc};
use zilzzz_proto::task::{OwnerId, Repeat, Task, TaskFields, TaskId, TaskPatch};

use super::TaskError;

/// How to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    /// A new task.
    Create,
    /// An existing task; the draft is seeded from it.
    Edit(Task),
}

/// What a running session will commit to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Commit creates a task.
    Create,
    /// Commit updates this task.
    Edit(TaskId),
}

/// A create-or-edit draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    mode: SessionMode,
    text: String,
    due_date: DateTime<Utc>,
    repeat: Repeat,
}

impl EditSession {
    /// Starts a draft. `now` is the default due date of a new task.
    #[must_use]
    pub fn begin(mode: EditMode, now: DateTime<Utc>) -> Self {
        match mode {
            EditMode::Create => Self {
                mode: SessionMode::Create,
                text: String::new(),
                due_date: now,
                repeat: Repeat::None,
            },
            EditMode::Edit(task) => Self {
                mode: SessionMode::Edit(task.id),
                text: task.text,
                due_date: task.due_date,
                repeat: task.repeat,
            },
        }
    }

    /// What a commit will do.
    #[must_use]
    pub const fn mode(&self) -> &SessionMode {
        &self.mode
    }

    /// Draft text, as typed.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Draft due date.
    #[must_use]
    pub const fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    /// Draft repeat cadence.
    #[must_use]
    pub const fn repeat(&self) -> Repeat {
        self.repeat
    }

    /// Replaces the draft text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Replaces the draft due date.
    pub const fn set_due_date(&mut self, due_date: DateTime<Utc>) {
        self.due_date = due_date;
    }

    /// Replaces the draft repeat cadence.
    pub const fn set_repeat(&mut self, repeat: Repeat) {
        self.repeat = repeat;
    }

    /// Checks the draft text.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TextEmpty`] for blank text, or
    /// [`TaskError::TextTooLong`] for more than `max_len` characters.
    pub fn validate(&self, max_len: usize) -> Result<(), TaskError> {
        if self.text.trim().is_empty() {
            return Err(TaskError::TextEmpty);
        }
        if self.text.chars().count() > max_len {
            return Err(TaskError::TextTooLong { max: max_len });
        }
        Ok(())
    }

    /// The create payload for this draft.
    #[must_use]
    pub fn to_fields(&self, owner: OwnerId, created_at: u64) -> TaskFields {
        TaskFields {
            text: self.text.clone(),
            owner_id: owner,
            due_date: self.due_date,
            repeat: self.repeat,
            completed: false,
            created_at,
        }
    }

    /// The edit payload for this draft: text, due date and repeat only.
    #[must_use]
    pub fn to_patch(&self) -> TaskPatch {
        TaskPatch::edit(self.text.clone(), self.due_date, self.repeat)
    }
}
