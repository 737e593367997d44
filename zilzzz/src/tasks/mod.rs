//! Reminder task engine for `Zilzzz`.
//!
//! Keeps a local mirror of the owner's tasks in step with the remote feed,
//! composes due dates through a date-then-time pick, and drives the
//! create/edit/toggle/delete lifecycle against the remote store.

pub mod cache;
pub mod controller;
pub mod due_date;
pub mod session;

pub use cache::{ApplyReport, LiveTaskCache, LocalTaskCache};
pub use controller::{CommitOutcome, TaskController};
pub use due_date::{DateStep, DueDateComposer, PickError, PickerState, TimeStep};
pub use session::{EditMode, EditSession, SessionMode};

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors that can occur during task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task text is empty or whitespace only.
    #[error("task text cannot be empty")]
    TextEmpty,
    /// Task text exceeds the maximum length.
    #[error("task text too long (max {max} characters)")]
    TextTooLong {
        /// Maximum allowed characters.
        max: usize,
    },
    /// No draft is being edited.
    #[error("no task is being edited")]
    NoActiveSession,
    /// Nobody is signed in.
    #[error("not signed in")]
    NotSignedIn,
    /// The picked date and time do not form a valid due date.
    #[error(transparent)]
    Pick(#[from] PickError),
    /// The remote store refused or failed the operation.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
