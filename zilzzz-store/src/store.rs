//! Authoritative in-memory task store with optional JSON persistence.
//!
//! The [`TaskStore`] holds every owner's tasks in creation order. All reads
//! and writes are scoped by owner: a task belonging to someone else behaves
//! exactly like a task that does not exist.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use zilzzz_proto::store::FailureReason;
use zilzzz_proto::task::{MAX_TASK_TEXT_LENGTH, OwnerId, Task, TaskFields, TaskId, TaskPatch};

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// No task with this id exists for the owner.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The write names a different owner than the caller.
    #[error("owner mismatch")]
    Forbidden,

    /// The write payload failed validation.
    #[error("invalid task: {0}")]
    Invalid(String),

    /// The data file could not be read or parsed.
    #[error("failed to load data file: {0}")]
    Persist(String),
}

impl StoreError {
    /// Maps this error onto the wire-level refusal reason.
    #[must_use]
    pub fn to_failure(&self) -> FailureReason {
        match self {
            Self::NotFound(_) => FailureReason::NotFound,
            Self::Forbidden => FailureReason::Forbidden,
            Self::Invalid(reason) => FailureReason::Invalid(reason.clone()),
            Self::Persist(reason) => FailureReason::Storage(reason.clone()),
        }
    }
}

/// Per-owner task storage.
///
/// Thread-safe via [`RwLock`]. When a data file is configured, the full
/// task list is written back after every successful mutation; a failed
/// write is logged and does not undo the mutation.
pub struct TaskStore {
    tasks: RwLock<Vec<Task>>,
    data_file: Option<PathBuf>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty, memory-only store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            data_file: None,
        }
    }

    /// Creates a store backed by a JSON data file.
    ///
    /// Existing tasks are loaded from `path` if the file exists; a missing
    /// file starts an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the file exists but cannot be
    /// read or does not contain a JSON task list.
    pub fn with_data_file(path: &Path) -> Result<Self, StoreError> {
        let tasks = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Vec<Task>>(&contents)
                .map_err(|e| StoreError::Persist(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Persist(format!("{}: {e}", path.display()))),
        };
        tracing::info!(path = %path.display(), count = tasks.len(), "loaded task data file");
        Ok(Self {
            tasks: RwLock::new(tasks),
            data_file: Some(path.to_path_buf()),
        })
    }

    /// Returns every task of `owner`, in creation order.
    pub async fn snapshot(&self, owner: &OwnerId) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .filter(|t| t.owner_id == *owner)
            .cloned()
            .collect()
    }

    /// Returns the total number of stored tasks across all owners.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Returns `true` if no owner has any task.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Creates a task for `owner` and returns the stored record.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Forbidden`] if `fields.owner_id` is not `owner`.
    /// - [`StoreError::Invalid`] if the text is blank or too long.
    pub async fn create(&self, owner: &OwnerId, fields: TaskFields) -> Result<Task, StoreError> {
        if fields.owner_id != *owner {
            return Err(StoreError::Forbidden);
        }
        validate_text(&fields.text)?;

        let task = fields.into_task(TaskId::new());
        let mut tasks = self.tasks.write().await;
        tasks.push(task.clone());
        self.persist(&tasks).await;
        drop(tasks);
        Ok(task)
    }

    /// Applies `patch` to one of `owner`'s tasks and returns the result.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if `owner` has no task `id`.
    /// - [`StoreError::Invalid`] if the patch sets a blank or too long text.
    pub async fn update(
        &self,
        owner: &OwnerId,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, StoreError> {
        if let Some(text) = &patch.text {
            validate_text(text)?;
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == *id && t.owner_id == *owner)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply(task);
        let updated = task.clone();
        self.persist(&tasks).await;
        drop(tasks);
        Ok(updated)
    }

    /// Removes one of `owner`'s tasks and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `owner` has no task `id`.
    pub async fn delete(&self, owner: &OwnerId, id: &TaskId) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let index = tasks
            .iter()
            .position(|t| t.id == *id && t.owner_id == *owner)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let removed = tasks.remove(index);
        self.persist(&tasks).await;
        drop(tasks);
        Ok(removed)
    }

    /// Writes the full task list to the data file, if one is configured.
    async fn persist(&self, tasks: &[Task]) {
        let Some(path) = &self.data_file else {
            return;
        };
        let json = match serde_json::to_string_pretty(tasks) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize tasks for data file");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, json).await {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "data file write failed, change kept in memory only"
            );
        }
    }
}

fn validate_text(text: &str) -> Result<(), StoreError> {
    if text.trim().is_empty() {
        return Err(StoreError::Invalid("task text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TASK_TEXT_LENGTH {
        return Err(StoreError::Invalid(format!(
            "task text too long (max {MAX_TASK_TEXT_LENGTH} characters)"
        )));
    }
    Ok(())
}
