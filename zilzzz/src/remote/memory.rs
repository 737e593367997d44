//! In-memory remote store for testing.
//!
//! [`InMemoryTaskStore`] plays the authoritative store inside the process.
//! Each [`InMemoryTaskChannel`] obtained from it is bound to one owner and
//! behaves like a connection to a real store: owner-filtered snapshots on
//! every change, owner checks on every write.
//!
//! ```rust,no_run
//! use zilzzz::remote::{InMemoryTaskStore, RemoteTaskChannel};
//! use zilzzz_proto::task::OwnerId;
//!
//! # async fn example() {
//! let store = InMemoryTaskStore::new();
//! let alice = OwnerId::new("alice");
//! let channel = store.channel_for(alice.clone());
//! let mut feed = channel.subscribe(&alice).await.unwrap();
//! assert!(feed.next().await.unwrap().is_empty());
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use zilzzz_proto::task::{OwnerId, Snapshot, Task, TaskFields, TaskId, TaskPatch};

use super::{RemoteError, RemoteTaskChannel, Subscription};

struct Listener {
    id: u64,
    owner: OwnerId,
    tx: mpsc::UnboundedSender<Snapshot<Task>>,
}

#[derive(Default)]
struct Inner {
    /// All records, in creation order.
    tasks: Vec<Task>,
    listeners: Vec<Listener>,
    next_listener: u64,
    write_calls: usize,
    fail_writes: bool,
}

impl Inner {
    fn snapshot_of(&self, owner: &OwnerId) -> Snapshot<Task> {
        Snapshot::new(
            self.tasks
                .iter()
                .filter(|t| t.owner_id == *owner)
                .cloned()
                .collect(),
        )
    }

    fn notify(&mut self, owner: &OwnerId) {
        let snapshot = self.snapshot_of(owner);
        self.listeners
            .retain(|l| l.owner != *owner || l.tx.send(snapshot.clone()).is_ok());
    }

    fn begin_write(&mut self) -> Result<(), RemoteError> {
        self.write_calls += 1;
        if self.fail_writes {
            return Err(RemoteError::Rejected("store unavailable".to_string()));
        }
        Ok(())
    }
}

/// Shared in-process task store.
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a channel acting for `owner`.
    #[must_use]
    pub fn channel_for(&self, owner: OwnerId) -> InMemoryTaskChannel {
        InMemoryTaskChannel {
            store: self.clone(),
            owner,
        }
    }

    /// Number of live feed listeners across all owners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Number of create/update/delete calls received, including refused ones.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.inner.lock().write_calls
    }

    /// Makes every following write fail with [`RemoteError::Rejected`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Returns `owner`'s records in creation order.
    #[must_use]
    pub fn tasks_of(&self, owner: &OwnerId) -> Vec<Task> {
        self.inner.lock().snapshot_of(owner).items
    }

    /// Total number of records across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    /// Stores a complete record as-is, bypassing owner checks, and notifies
    /// that owner's listeners. Used to seed fixtures.
    pub fn insert(&self, task: Task) {
        let owner = task.owner_id.clone();
        let mut inner = self.inner.lock();
        inner.tasks.push(task);
        inner.notify(&owner);
    }
}

/// A [`RemoteTaskChannel`] backed by an [`InMemoryTaskStore`], bound to one
/// owner.
#[derive(Clone)]
pub struct InMemoryTaskChannel {
    store: InMemoryTaskStore,
    owner: OwnerId,
}

impl InMemoryTaskChannel {
    /// The owner this channel acts for.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The store behind this channel.
    #[must_use]
    pub const fn store(&self) -> &InMemoryTaskStore {
        &self.store
    }

    fn check_owner(&self, owner: &OwnerId) -> Result<(), RemoteError> {
        if *owner == self.owner {
            Ok(())
        } else {
            Err(RemoteError::Forbidden(format!(
                "channel for {} cannot act for {owner}",
                self.owner
            )))
        }
    }
}

impl RemoteTaskChannel for InMemoryTaskChannel {
    async fn subscribe(&self, owner: &OwnerId) -> Result<Subscription<Task>, RemoteError> {
        self.check_owner(owner)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.store.inner.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;
        // The current record set goes out before any later change.
        let _ = tx.send(inner.snapshot_of(owner));
        inner.listeners.push(Listener {
            id,
            owner: owner.clone(),
            tx,
        });
        drop(inner);

        tracing::debug!(owner = %owner, listener = id, "in-memory feed subscribed");
        let shared = Arc::clone(&self.store.inner);
        Ok(Subscription::with_release(rx, move || {
            shared.lock().listeners.retain(|l| l.id != id);
        }))
    }

    async fn create(&self, fields: TaskFields) -> Result<TaskId, RemoteError> {
        let mut inner = self.store.inner.lock();
        inner.begin_write()?;
        self.check_owner(&fields.owner_id)?;
        if fields.text.trim().is_empty() {
            return Err(RemoteError::Rejected("task text cannot be empty".to_string()));
        }

        let id = TaskId::new();
        inner.tasks.push(fields.into_task(id.clone()));
        inner.notify(&self.owner);
        Ok(id)
    }

    async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), RemoteError> {
        let mut inner = self.store.inner.lock();
        inner.begin_write()?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == *id && t.owner_id == self.owner)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        patch.apply(task);
        inner.notify(&self.owner);
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let mut inner = self.store.inner.lock();
        inner.begin_write()?;
        let index = inner
            .tasks
            .iter()
            .position(|t| t.id == *id && t.owner_id == self.owner)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        inner.tasks.remove(index);
        inner.notify(&self.owner);
        Ok(())
    }
}
