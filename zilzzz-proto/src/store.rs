//! Store wire protocol for the `Zilzzz` task store.
//!
//! Defines the [`StoreMessage`] enum that is postcard-encoded and sent over
//! WebSocket binary frames between clients and the store server.
//!
//! A connection is bound to one owner by its opening `Hello`. Everything
//! after that (subscriptions, reads, writes) is scoped to that owner.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::task::{OwnerId, Task, TaskFields, TaskId, TaskPatch};

/// Correlates a write request with its response on the same connection.
pub type RequestId = u64;

/// Why the store refused a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// No task with that id exists for this owner.
    NotFound,
    /// The request tried to act for a different owner.
    Forbidden,
    /// The request payload failed validation.
    Invalid(String),
    /// The store could not complete the write.
    Storage(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::Invalid(reason) => write!(f, "invalid: {reason}"),
            Self::Storage(reason) => write!(f, "storage failure: {reason}"),
        }
    }
}

/// Messages exchanged between store clients and the store server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreMessage {
    /// Client declares the owner it acts for.
    ///
    /// Must be the first message after the WebSocket connection opens.
    /// The server answers with [`StoreMessage::Welcome`].
    Hello {
        /// Owner identity of this connection.
        owner_id: OwnerId,
    },

    /// Server accepts the connection for the given owner.
    Welcome {
        /// The owner echoed back for confirmation.
        owner_id: OwnerId,
    },

    /// Client starts the owner's change feed.
    ///
    /// The server answers immediately with a [`StoreMessage::Snapshot`] and
    /// sends another after every change to the owner's tasks.
    Subscribe,

    /// Client stops the change feed.
    Unsubscribe,

    /// Full current set of the owner's tasks.
    Snapshot {
        /// Every task of the owner, in creation order.
        tasks: Vec<Task>,
    },

    /// Client asks the store to create a task.
    Create {
        /// Correlation id.
        request_id: RequestId,
        /// Fields of the new task.
        fields: TaskFields,
    },

    /// Client asks the store to patch a task.
    Update {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        id: TaskId,
        /// Fields to overwrite.
        patch: TaskPatch,
    },

    /// Client asks the store to delete a task.
    Delete {
        /// Correlation id.
        request_id: RequestId,
        /// Target task.
        id: TaskId,
    },

    /// A create succeeded.
    Created {
        /// Correlation id of the `Create`.
        request_id: RequestId,
        /// Id assigned by the store.
        id: TaskId,
    },

    /// An update or delete succeeded.
    Done {
        /// Correlation id of the request.
        request_id: RequestId,
    },

    /// A write was refused.
    Failed {
        /// Correlation id of the request.
        request_id: RequestId,
        /// Why it was refused.
        reason: FailureReason,
    },

    /// Connection-level error not tied to a request.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

impl StoreMessage {
    /// Returns the correlation id for request/response variants.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Create { request_id, .. }
            | Self::Update { request_id, .. }
            | Self::Delete { request_id, .. }
            | Self::Created { request_id, .. }
            | Self::Done { request_id }
            | Self::Failed { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

/// Encodes a [`StoreMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(msg: &StoreMessage) -> Result<Vec<u8>, CodecError> {
    codec::encode(msg)
}

/// Decodes a [`StoreMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn decode(bytes: &[u8]) -> Result<StoreMessage, CodecError> {
    codec::decode(bytes)
}
