//! Remote task channel abstraction for `Zilzzz`.
//!
//! Defines the [`RemoteTaskChannel`] trait: an owner-filtered change feed of
//! task records plus create/update/delete writes against the authoritative
//! store. Concrete implementations:
//! - [`memory::InMemoryTaskChannel`]: in-process store for tests and demos
//! - [`ws::WsTaskChannel`]: WebSocket client for the `zilzzz-store` server

pub mod memory;
pub mod ws;

pub use memory::{InMemoryTaskChannel, InMemoryTaskStore};
pub use ws::WsTaskChannel;

use tokio::sync::mpsc;
use zilzzz_proto::codec::CodecError;
use zilzzz_proto::task::{OwnerId, Snapshot, Task, TaskFields, TaskId, TaskPatch};

/// Errors that can occur during remote operations.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The store has no such task for this owner.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The operation tried to act for a different owner.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The store refused the write.
    #[error("rejected by store: {0}")]
    Rejected(String),

    /// The operation timed out before the store answered.
    #[error("remote operation timed out")]
    Timeout,

    /// The connection to the store has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An underlying I/O error occurred.
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live feed of full snapshots.
///
/// Each item is the complete current record set. Dropping the subscription
/// runs its release hook, which detaches the listener from the channel.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Snapshot<T>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    /// Wraps a receiver with no release hook.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot<T>>) -> Self {
        Self { rx, release: None }
    }

    /// Wraps a receiver; `release` runs exactly once when the subscription
    /// is dropped.
    #[must_use]
    pub fn with_release(
        rx: mpsc::UnboundedReceiver<Snapshot<T>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Waits for the next snapshot. Returns `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Snapshot<T>> {
        self.rx.recv().await
    }

    /// Returns a snapshot if one is already waiting.
    pub fn try_next(&mut self) -> Option<Snapshot<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_release", &self.release.is_some())
            .finish_non_exhaustive()
    }
}

/// Async channel to the authoritative task store.
///
/// Every implementation is bound to one owner: the feed only ever carries
/// that owner's records and writes for any other owner are refused.
pub trait RemoteTaskChannel: Send + Sync {
    /// Subscribe to `owner`'s task feed.
    ///
    /// The first snapshot (the current record set) is delivered as soon as
    /// the store has it; another follows every change.
    fn subscribe(
        &self,
        owner: &OwnerId,
    ) -> impl std::future::Future<Output = Result<Subscription<Task>, RemoteError>> + Send;

    /// Create a task; returns the id assigned by the store.
    fn create(
        &self,
        fields: TaskFields,
    ) -> impl std::future::Future<Output = Result<TaskId, RemoteError>> + Send;

    /// Overwrite the fields present in `patch`.
    fn update(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Delete a task.
    fn delete(&self, id: &TaskId)
    -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;
}
