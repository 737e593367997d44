//! Task controller: runs edit sessions and direct task actions against the
//! remote store.
//!
//! At most one [`EditSession`] is active. Starting a new one replaces the
//! previous draft and resets the due date picker. Completion toggles and
//! deletes go straight to the channel without touching the draft.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use zilzzz_proto::task::{MAX_TASK_TEXT_LENGTH, Repeat, Task, TaskId, TaskPatch};

use super::TaskError;
use super::due_date::{DueDateComposer, PickerState, TimeStep};
use super::session::{EditMode, EditSession, SessionMode};
use crate::clock::{Clock, epoch_millis};
use crate::identity::IdentityProvider;
use crate::notify::{JobHandle, NotificationError, NotificationScheduler, Notifier};
use crate::remote::RemoteTaskChannel;

/// What a successful commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A task was created. The reminder result is reported separately; a
    /// failed reminder does not undo the create.
    Created {
        /// Store-assigned id of the new task.
        id: TaskId,
        /// Handle of the scheduled reminder, or why it was not scheduled.
        reminder: Result<JobHandle, NotificationError>,
    },
    /// An existing task was updated.
    Updated {
        /// Id of the updated task.
        id: TaskId,
    },
}

impl CommitOutcome {
    /// Id of the created or updated task.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        match self {
            Self::Created { id, .. } | Self::Updated { id } => id,
        }
    }
}

/// Drives the create/edit/toggle/delete lifecycle.
pub struct TaskController<C, N> {
    channel: C,
    identity: Arc<dyn IdentityProvider>,
    scheduler: NotificationScheduler<N>,
    clock: Arc<dyn Clock>,
    session: Option<EditSession>,
    composer: DueDateComposer,
    max_text_len: usize,
}

impl<C: RemoteTaskChannel, N: Notifier> TaskController<C, N> {
    /// Creates a controller with no active session.
    ///
    /// The due date picker works in the scheduler's zone.
    pub fn new(
        channel: C,
        identity: Arc<dyn IdentityProvider>,
        scheduler: NotificationScheduler<N>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let composer = DueDateComposer::new(scheduler.zone());
        Self {
            channel,
            identity,
            scheduler,
            clock,
            session: None,
            composer,
            max_text_len: MAX_TASK_TEXT_LENGTH,
        }
    }

    /// Sets the maximum task text length in characters.
    #[must_use]
    pub const fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }

    /// The remote channel.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// The reminder scheduler.
    pub const fn scheduler(&self) -> &NotificationScheduler<N> {
        &self.scheduler
    }

    /// The active draft, if any.
    pub const fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    /// Current due date picker state.
    pub const fn picker(&self) -> &PickerState {
        self.composer.state()
    }

    /// Starts a session, replacing any previous draft and open pick.
    pub fn begin(&mut self, mode: EditMode) -> &EditSession {
        self.composer.cancel();
        let session = EditSession::begin(mode, self.clock.now());
        tracing::debug!(mode = ?session.mode(), "edit session started");
        self.session.insert(session)
    }

    fn session_mut(&mut self) -> Result<&mut EditSession, TaskError> {
        self.session.as_mut().ok_or(TaskError::NoActiveSession)
    }

    /// Sets the draft text.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoActiveSession`] if no draft is active.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), TaskError> {
        self.session_mut()?.set_text(text);
        Ok(())
    }

    /// Sets the draft repeat cadence.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoActiveSession`] if no draft is active.
    pub fn set_repeat(&mut self, repeat: Repeat) -> Result<(), TaskError> {
        self.session_mut()?.set_repeat(repeat);
        Ok(())
    }

    /// Sets the draft due date directly, abandoning any open pick.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoActiveSession`] if no draft is active.
    pub fn set_due_date(&mut self, due_date: DateTime<Utc>) -> Result<(), TaskError> {
        self.session_mut()?.set_due_date(due_date);
        self.composer.cancel();
        Ok(())
    }

    /// Starts a date-then-time pick seeded with the draft due date.
    ///
    /// Returns `false` if a pick is already open.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoActiveSession`] if no draft is active.
    pub fn begin_due_date_pick(&mut self) -> Result<bool, TaskError> {
        let seed = self.session_mut()?.due_date();
        Ok(self.composer.begin_pick(seed))
    }

    /// Chooses the pick's date. Returns `None` if no date was being picked.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoActiveSession`] if no draft is active.
    pub fn choose_date(&mut self, date: NaiveDate) -> Result<Option<TimeStep>, TaskError> {
        self.session_mut()?;
        Ok(self.composer.choose_date(date))
    }

    /// Chooses the pick's time and writes the result into the draft.
    ///
    /// Returns the new due date, or `None` if no time was being picked.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoActiveSession`] if no draft is active, or
    /// [`TaskError::Pick`] for an invalid time (the pick stays open).
    pub fn choose_time(
        &mut self,
        hour: u32,
        minute: u32,
    ) -> Result<Option<DateTime<Utc>>, TaskError> {
        self.session_mut()?;
        let Some(due) = self.composer.choose_time(hour, minute)? else {
            return Ok(None);
        };
        self.session_mut()?.set_due_date(due);
        Ok(Some(due))
    }

    /// Abandons an open pick. Returns `true` if one was open.
    pub fn cancel_pick(&mut self) -> bool {
        self.composer.cancel()
    }

    /// Discards the draft and any open pick. Returns `true` if a draft was
    /// active.
    pub fn cancel(&mut self) -> bool {
        self.composer.cancel();
        let had_session = self.session.take().is_some();
        if had_session {
            tracing::debug!("edit session cancelled");
        }
        had_session
    }

    /// Sends the draft to the store.
    ///
    /// A create also schedules the task's reminder. The draft is cleared
    /// only when the remote call succeeds.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NoActiveSession`] if no draft is active.
    /// - [`TaskError::TextEmpty`] or [`TaskError::TextTooLong`] if the text
    ///   is invalid; nothing is sent.
    /// - [`TaskError::NotSignedIn`] for a create with nobody signed in.
    /// - [`TaskError::Remote`] if the store refuses or fails the call; the
    ///   draft stays as it was.
    pub async fn commit(&mut self) -> Result<CommitOutcome, TaskError> {
        let session = self.session.as_ref().ok_or(TaskError::NoActiveSession)?;
        session.validate(self.max_text_len)?;

        let outcome = match session.mode().clone() {
            SessionMode::Create => {
                let owner = self
                    .identity
                    .current_owner()
                    .ok_or(TaskError::NotSignedIn)?;
                let fields = session.to_fields(owner, epoch_millis(self.clock.now()));
                let id = self.channel.create(fields.clone()).await?;
                tracing::info!(task_id = %id, "task created");

                let task = fields.into_task(id.clone());
                let reminder = self.scheduler.schedule(&task).await;
                CommitOutcome::Created { id, reminder }
            }
            SessionMode::Edit(id) => {
                self.channel.update(&id, session.to_patch()).await?;
                tracing::info!(task_id = %id, "task updated");
                CommitOutcome::Updated { id }
            }
        };

        self.session = None;
        self.composer.cancel();
        Ok(outcome)
    }

    /// Flips `task`'s completion flag in the store. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the update fails.
    pub async fn toggle_completion(&self, task: &Task) -> Result<bool, TaskError> {
        let completed = !task.completed;
        self.channel
            .update(&task.id, TaskPatch::completion(completed))
            .await?;
        tracing::info!(task_id = %task.id, completed, "task completion toggled");
        Ok(completed)
    }

    /// Deletes a task from the store.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the delete fails, including for an
    /// unknown id.
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), TaskError> {
        self.channel.delete(id).await?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }
}
