//! In-memory notifier for tests and dry runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{JobHandle, NotificationError, NotificationJob, Notifier, Permission};

#[derive(Default)]
struct Inner {
    jobs: Mutex<Vec<(JobHandle, NotificationJob)>>,
    fail_next: Mutex<Option<NotificationError>>,
    denied: AtomicBool,
    next_handle: AtomicU64,
}

/// Records every scheduled job instead of showing it.
///
/// Cloning yields another handle to the same record, so a test can keep one
/// clone while the scheduler owns another.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    inner: Arc<Inner>,
}

impl RecordingNotifier {
    /// Creates a notifier that grants permission and accepts every job.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `request_permission` answer `Denied` (or `Granted` again).
    pub fn deny_permission(&self, denied: bool) {
        self.inner.denied.store(denied, Ordering::SeqCst);
    }

    /// Makes the next `schedule` call fail with `error`.
    pub fn fail_next(&self, error: NotificationError) {
        *self.inner.fail_next.lock() = Some(error);
    }

    /// Jobs scheduled so far, in order.
    #[must_use]
    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.inner.jobs.lock().iter().map(|(_, j)| j.clone()).collect()
    }

    /// Handles issued so far, in order.
    #[must_use]
    pub fn handles(&self) -> Vec<JobHandle> {
        self.inner.jobs.lock().iter().map(|(h, _)| *h).collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn request_permission(&self) -> Permission {
        if self.inner.denied.load(Ordering::SeqCst) {
            Permission::Denied
        } else {
            Permission::Granted
        }
    }

    async fn schedule(&self, job: NotificationJob) -> Result<JobHandle, NotificationError> {
        if let Some(error) = self.inner.fail_next.lock().take() {
            return Err(error);
        }
        let handle = JobHandle::new(self.inner.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner.jobs.lock().push((handle, job));
        Ok(handle)
    }
}
