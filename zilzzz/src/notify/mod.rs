//! Reminder scheduling for `Zilzzz`.
//!
//! [`NotificationScheduler`] turns a task into a [`NotificationJob`] and hands
//! it to a [`Notifier`], the device notification capability. A task that
//! does not repeat fires once at its due instant; a daily or weekly task
//! fires every day at its due time-of-day.
//!
//! Implementations of [`Notifier`]:
//! - [`desktop::DesktopNotifier`]: tokio timers and desktop popups
//! - [`recording::RecordingNotifier`]: keeps jobs in memory for tests

pub mod desktop;
pub mod recording;

pub use desktop::DesktopNotifier;
pub use recording::RecordingNotifier;

use std::fmt;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use zilzzz_proto::task::Task;

use crate::clock::LocalZone;

/// Default notification title.
pub const DEFAULT_TITLE: &str = "Zilzzz Reminder";

/// Errors that can occur when scheduling a reminder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// The user has not allowed notifications.
    #[error("notification permission denied")]
    PermissionDenied,

    /// A one-shot reminder's instant is already in the past.
    #[error("reminder time has already passed")]
    TriggerElapsed,

    /// The notification capability failed.
    #[error("notification capability failed: {0}")]
    Capability(String),
}

/// When a notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Once, at this instant.
    Absolute(DateTime<Utc>),
    /// Every day at this local time.
    Recurring {
        /// Hour of day, 0–23.
        hour: u32,
        /// Minute of hour, 0–59.
        minute: u32,
    },
}

impl Trigger {
    /// Whether the trigger fires more than once.
    #[must_use]
    pub const fn repeats(&self) -> bool {
        matches!(self, Self::Recurring { .. })
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(at) => write!(f, "once at {}", at.to_rfc3339()),
            Self::Recurring { hour, minute } => write!(f, "every day at {hour:02}:{minute:02}"),
        }
    }
}

/// A notification to register with the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    /// Notification title.
    pub title: String,
    /// Notification body (the task text).
    pub body: String,
    /// Whether to play a sound.
    pub sound: bool,
    /// When to fire.
    pub trigger: Trigger,
}

/// Opaque handle to a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(u64);

impl JobHandle {
    /// Wraps a notifier-assigned job number.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The job number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Notifications may be shown.
    Granted,
    /// Notifications may not be shown.
    Denied,
}

/// Device notification capability.
pub trait Notifier: Send + Sync {
    /// Ask whether notifications may be shown.
    fn request_permission(&self) -> impl std::future::Future<Output = Permission> + Send;

    /// Register a job; returns its handle.
    fn schedule(
        &self,
        job: NotificationJob,
    ) -> impl std::future::Future<Output = Result<JobHandle, NotificationError>> + Send;
}

/// Builds the trigger for `task`.
///
/// Recurring tasks keep only the time-of-day of their due date in `zone`;
/// daily and weekly produce the same trigger.
#[must_use]
pub fn trigger_for<Tz: TimeZone>(task: &Task, zone: &Tz) -> Trigger {
    if task.repeat.is_recurring() {
        let local = task.due_date.with_timezone(zone);
        Trigger::Recurring {
            hour: local.hour(),
            minute: local.minute(),
        }
    } else {
        Trigger::Absolute(task.due_date)
    }
}

/// Schedules reminders for newly created tasks.
pub struct NotificationScheduler<N> {
    notifier: N,
    zone: LocalZone,
    title: String,
    sound: bool,
}

impl<N: Notifier> NotificationScheduler<N> {
    /// Creates a scheduler computing local times in `zone`.
    #[must_use]
    pub fn new(notifier: N, zone: impl Into<LocalZone>) -> Self {
        Self {
            notifier,
            zone: zone.into(),
            title: DEFAULT_TITLE.to_string(),
            sound: true,
        }
    }

    /// Sets the notification title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets whether notifications play a sound.
    #[must_use]
    pub const fn with_sound(mut self, sound: bool) -> Self {
        self.sound = sound;
        self
    }

    /// The notifier jobs are handed to.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The zone local times are computed in.
    #[must_use]
    pub const fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Builds the job for `task` without scheduling it.
    #[must_use]
    pub fn job_for(&self, task: &Task) -> NotificationJob {
        NotificationJob {
            title: self.title.clone(),
            body: task.text.clone(),
            sound: self.sound,
            trigger: trigger_for(task, &self.zone),
        }
    }

    /// Schedules the reminder for `task`.
    ///
    /// Failures are logged and returned; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::PermissionDenied`] if the notifier
    /// refuses permission, or whatever the notifier's `schedule` reports.
    pub async fn schedule(&self, task: &Task) -> Result<JobHandle, NotificationError> {
        let result = if self.notifier.request_permission().await == Permission::Denied {
            Err(NotificationError::PermissionDenied)
        } else {
            let job = self.job_for(task);
            self.notifier.schedule(job).await
        };

        match &result {
            Ok(handle) => tracing::info!(task_id = %task.id, job = %handle, "reminder scheduled"),
            Err(e) => tracing::warn!(task_id = %task.id, error = %e, "reminder not scheduled"),
        }
        result
    }
}
