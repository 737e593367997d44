//! Desktop notifier: tokio timers that raise desktop popups.
//!
//! Each scheduled job is one tokio task sleeping until its next fire
//! instant. Popups go through `notify-rust` on Linux and macOS; elsewhere
//! the firing is only logged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;

use super::{JobHandle, NotificationError, NotificationJob, Notifier, Permission, Trigger};
use crate::clock::{LocalZone, resolve_local};

/// Computes when `trigger` next fires after `now`.
///
/// A recurring trigger fires at its wall time in `zone` on the first day
/// whose occurrence is after `now`, so clock changes never shift it.
///
/// # Errors
///
/// - [`NotificationError::TriggerElapsed`] for an absolute instant before
///   `now`.
/// - [`NotificationError::Capability`] for a recurring time that is not a
///   valid time of day.
pub fn next_fire<Tz: TimeZone>(
    trigger: &Trigger,
    now: DateTime<Utc>,
    zone: &Tz,
) -> Result<DateTime<Utc>, NotificationError> {
    match *trigger {
        Trigger::Absolute(at) if at < now => Err(NotificationError::TriggerElapsed),
        Trigger::Absolute(at) => Ok(at),
        Trigger::Recurring { hour, minute } => {
            let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
                NotificationError::Capability(format!("invalid time {hour:02}:{minute:02}"))
            })?;
            let today = now.with_timezone(zone).date_naive();
            today
                .iter_days()
                .take(3)
                .filter_map(|day| resolve_local(zone, day.and_time(time)))
                .find(|candidate| *candidate > now)
                .ok_or_else(|| NotificationError::Capability("unrepresentable time".to_string()))
        }
    }
}

/// [`Notifier`] that shows desktop popups at the trigger time.
///
/// Jobs live only as long as the notifier: [`DesktopNotifier::cancel_all`]
/// and `Drop` abort every outstanding timer.
pub struct DesktopNotifier {
    enabled: bool,
    zone: LocalZone,
    next_handle: AtomicU64,
    jobs: Mutex<HashMap<JobHandle, tokio::task::JoinHandle<()>>>,
}

impl DesktopNotifier {
    /// Creates an enabled notifier computing local times in `zone`.
    #[must_use]
    pub fn new(zone: impl Into<LocalZone>) -> Self {
        Self {
            enabled: true,
            zone: zone.into(),
            next_handle: AtomicU64::new(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a notifier that denies permission and schedules nothing.
    #[must_use]
    pub fn disabled(zone: impl Into<LocalZone>) -> Self {
        Self {
            enabled: false,
            zone: zone.into(),
            next_handle: AtomicU64::new(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of jobs still waiting to fire (recurring jobs never finish).
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        let mut jobs = self.jobs.lock();
        jobs.retain(|_, handle| !handle.is_finished());
        jobs.len()
    }

    /// Aborts every outstanding job.
    pub fn cancel_all(&self) {
        let mut jobs = self.jobs.lock();
        for (handle, task) in jobs.drain() {
            task.abort();
            tracing::debug!(job = %handle, "reminder cancelled");
        }
    }
}

impl Drop for DesktopNotifier {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl Notifier for DesktopNotifier {
    async fn request_permission(&self) -> Permission {
        if self.enabled {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    async fn schedule(&self, job: NotificationJob) -> Result<JobHandle, NotificationError> {
        if !self.enabled {
            return Err(NotificationError::PermissionDenied);
        }
        let first = next_fire(&job.trigger, Utc::now(), &self.zone)?;
        let handle = JobHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(job = %handle, trigger = %job.trigger, first = %first, "arming reminder");
        let task = tokio::spawn(run_job(handle, job, first, self.zone));
        let mut jobs = self.jobs.lock();
        jobs.retain(|_, running| !running.is_finished());
        jobs.insert(handle, task);
        Ok(handle)
    }
}

/// Sleeps until each fire instant and shows the popup; recurring jobs
/// re-arm for the same wall time on the next day.
async fn run_job(handle: JobHandle, job: NotificationJob, first: DateTime<Utc>, zone: LocalZone) {
    let mut fire_at = first;
    loop {
        let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let popup = job.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || show_popup(&popup)).await {
            tracing::warn!(job = %handle, error = %e, "popup task failed");
        }

        if !job.trigger.repeats() {
            break;
        }
        match next_fire(&job.trigger, fire_at, &zone) {
            Ok(next) => fire_at = next,
            Err(e) => {
                tracing::warn!(job = %handle, error = %e, "recurring reminder stopped");
                break;
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn show_popup(job: &NotificationJob) {
    let mut notification = notify_rust::Notification::new();
    notification.summary(&job.title).body(&job.body);
    if job.sound {
        #[cfg(target_os = "linux")]
        notification.hint(notify_rust::Hint::SoundName(
            "message-new-instant".to_string(),
        ));
        #[cfg(target_os = "macos")]
        notification.sound_name("Ping");
    }
    match notification.show() {
        Ok(_) => tracing::debug!(title = %job.title, "desktop notification shown"),
        Err(e) => tracing::warn!(error = %e, "failed to show desktop notification"),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn show_popup(job: &NotificationJob) {
    tracing::info!(
        title = %job.title,
        body = %job.body,
        "reminder due (desktop notifications not supported on this OS)"
    );
}
