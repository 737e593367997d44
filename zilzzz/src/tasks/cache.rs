//! Local mirror of the owner's tasks, driven by the remote feed.
//!
//! [`LocalTaskCache`] holds the tasks of the most recent snapshot and never
//! originates task data. [`LiveTaskCache`] owns the subscription and the
//! pump task feeding it; the subscription is released when the live cache
//! is deactivated or dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use zilzzz_proto::task::{OwnerId, Snapshot, Task, TaskId};

use crate::remote::{RemoteError, RemoteTaskChannel};

/// Outcome of applying one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Records now held.
    pub accepted: usize,
    /// Records dropped because they belong to another owner.
    pub rejected_foreign: usize,
}

/// In-memory mirror of one owner's tasks.
#[derive(Debug, Clone)]
pub struct LocalTaskCache {
    owner: OwnerId,
    /// Tasks in feed order.
    tasks: Vec<Task>,
    version: u64,
}

impl LocalTaskCache {
    /// Creates an empty cache for `owner`.
    #[must_use]
    pub const fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            tasks: Vec::new(),
            version: 0,
        }
    }

    /// The owner this cache mirrors.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Replaces the held tasks with the snapshot's.
    ///
    /// Records of other owners are dropped. If an id appears twice, the
    /// later record wins and keeps the earlier position.
    pub fn apply(&mut self, snapshot: &Snapshot<Task>) -> ApplyReport {
        let mut next: Vec<Task> = Vec::with_capacity(snapshot.len());
        let mut positions: HashMap<&TaskId, usize> = HashMap::with_capacity(snapshot.len());
        let mut rejected_foreign = 0;

        for task in &snapshot.items {
            if task.owner_id != self.owner {
                tracing::warn!(
                    task_id = %task.id,
                    owner = %task.owner_id,
                    expected = %self.owner,
                    "dropping task record of another owner"
                );
                rejected_foreign += 1;
                continue;
            }
            if let Some(&at) = positions.get(&task.id) {
                next[at] = task.clone();
            } else {
                positions.insert(&task.id, next.len());
                next.push(task.clone());
            }
        }

        self.tasks = next;
        self.version += 1;
        tracing::debug!(
            tasks = self.tasks.len(),
            rejected = rejected_foreign,
            version = self.version,
            "snapshot applied"
        );
        ApplyReport {
            accepted: self.tasks.len(),
            rejected_foreign,
        }
    }

    /// Tasks sorted by ascending due date; equal due dates keep feed order.
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        let mut sorted = self.tasks.clone();
        sorted.sort_by_key(|t| t.due_date);
        sorted
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    /// Number of held tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no tasks are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of snapshots applied so far.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

/// The spawned task feeding snapshots into the cache. Aborted on drop.
struct FeedPump {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FeedPump {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A [`LocalTaskCache`] kept current by a live feed subscription.
pub struct LiveTaskCache {
    cache: Arc<RwLock<LocalTaskCache>>,
    version_tx: Arc<watch::Sender<u64>>,
    pump: Option<FeedPump>,
}

impl LiveTaskCache {
    /// Creates an inactive cache for `owner`.
    #[must_use]
    pub fn new(owner: OwnerId) -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            cache: Arc::new(RwLock::new(LocalTaskCache::new(owner))),
            version_tx: Arc::new(version_tx),
            pump: None,
        }
    }

    /// Subscribes to the owner's feed and starts applying snapshots.
    ///
    /// Only the first call subscribes; while active, further calls return
    /// `Ok(false)` and do nothing.
    ///
    /// # Errors
    ///
    /// Returns the channel's error if the subscription is refused.
    pub async fn activate<C: RemoteTaskChannel>(&mut self, channel: &C) -> Result<bool, RemoteError> {
        if self.pump.is_some() {
            return Ok(false);
        }

        let owner = self.cache.read().owner().clone();
        let mut subscription = channel.subscribe(&owner).await?;
        let cache = Arc::clone(&self.cache);
        let version_tx = Arc::clone(&self.version_tx);
        let pump_owner = owner.clone();

        let handle = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                let version = {
                    let mut cache = cache.write();
                    cache.apply(&snapshot);
                    cache.version()
                };
                version_tx.send_replace(version);
            }
            tracing::info!(owner = %pump_owner, "task feed ended");
        });

        self.pump = Some(FeedPump { handle });
        tracing::info!(owner = %owner, "task feed activated");
        Ok(true)
    }

    /// Stops the pump and releases the subscription.
    ///
    /// Returns `true` if the cache was active.
    pub fn deactivate(&mut self) -> bool {
        let was_active = self.pump.take().is_some();
        if was_active {
            tracing::info!("task feed deactivated");
        }
        was_active
    }

    /// Whether a feed pump is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.pump.is_some()
    }

    /// Copy of the tasks sorted by ascending due date.
    #[must_use]
    pub fn snapshot_list(&self) -> Vec<Task> {
        self.cache.read().list()
    }

    /// Copy of one task.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.cache.read().get(id).cloned()
    }

    /// Number of held tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns `true` if no tasks are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Number of snapshots applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.cache.read().version()
    }

    /// Receiver notified with the new version after each snapshot.
    #[must_use]
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}
