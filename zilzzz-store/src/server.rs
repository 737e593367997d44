//! Store server core: shared state, WebSocket handler, subscriber registry,
//! and snapshot fan-out.
//!
//! Each WebSocket connection opens with a `Hello` that binds it to one owner.
//! Writes are applied to the [`TaskStore`] and answered on the same
//! connection; after every successful write the owner's full task list is
//! pushed to each of that owner's subscribed connections.
//!
//! Snapshot reads and their fan-out happen under the subscriber registry
//! lock, so a subscriber always receives snapshots in store order and the
//! last one it gets is the current list.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};
use zilzzz_proto::store::{self, StoreMessage};
use zilzzz_proto::task::OwnerId;

use crate::store::TaskStore;

/// Identifies one live WebSocket connection.
type ConnId = u64;

/// Shared server state holding the task store and the subscriber registry.
pub struct ServerState {
    /// Authoritative task storage.
    pub store: TaskStore,
    /// Subscribed connections per owner.
    subscribers: RwLock<HashMap<OwnerId, Vec<(ConnId, mpsc::UnboundedSender<Message>)>>>,
    next_conn: AtomicU64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates a server state with an empty, memory-only store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(TaskStore::new())
    }

    /// Creates a server state around an existing store.
    #[must_use]
    pub fn with_store(store: TaskStore) -> Self {
        Self {
            store,
            subscribers: RwLock::new(HashMap::new()),
            next_conn: AtomicU64::new(1),
        }
    }

    fn next_conn_id(&self) -> ConnId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a connection to the owner's subscriber list and queues the
    /// owner's current task list on it. Returns how many tasks were sent.
    ///
    /// Subscribing twice from the same connection keeps a single entry.
    pub async fn subscribe(
        &self,
        owner: &OwnerId,
        conn: ConnId,
        sender: mpsc::UnboundedSender<Message>,
    ) -> usize {
        let mut subs = self.subscribers.write().await;
        let tasks = self.store.snapshot(owner).await;
        let count = tasks.len();
        reply(&sender, &StoreMessage::Snapshot { tasks });
        let list = subs.entry(owner.clone()).or_default();
        list.retain(|(id, _)| *id != conn);
        list.push((conn, sender));
        count
    }

    /// Removes a connection from the owner's subscriber list.
    ///
    /// Returns `true` if the connection was subscribed.
    pub async fn unsubscribe(&self, owner: &OwnerId, conn: ConnId) -> bool {
        let mut subs = self.subscribers.write().await;
        let Some(list) = subs.get_mut(owner) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != conn);
        let removed = list.len() != before;
        if list.is_empty() {
            subs.remove(owner);
        }
        removed
    }

    /// Returns how many connections are subscribed to `owner`'s feed.
    pub async fn subscriber_count(&self, owner: &OwnerId) -> usize {
        let subs = self.subscribers.read().await;
        subs.get(owner).map_or(0, Vec::len)
    }

    /// Pushes the owner's current task list to every subscriber.
    ///
    /// Subscribers whose channel is closed are dropped from the registry.
    pub async fn broadcast_snapshot(&self, owner: &OwnerId) {
        let mut subs = self.subscribers.write().await;
        let Some(list) = subs.get_mut(owner) else {
            return;
        };

        let tasks = self.store.snapshot(owner).await;
        let count = tasks.len();
        let bytes = match store::encode(&StoreMessage::Snapshot { tasks }) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(owner = %owner, error = %e, "failed to encode snapshot");
                return;
            }
        };

        list.retain(|(conn, sender)| {
            let alive = sender.send(Message::Binary(bytes.clone().into())).is_ok();
            if !alive {
                tracing::warn!(owner = %owner, conn = conn, "dropping closed subscriber");
            }
            alive
        });
        tracing::debug!(owner = %owner, subscribers = list.len(), tasks = count, "snapshot pushed");
        if list.is_empty() {
            subs.remove(owner);
        }
    }

    /// Queues a Close frame on every subscribed connection, for shutdown.
    pub async fn close_all_connections(&self) {
        let subs = self.subscribers.read().await;
        for (owner, list) in subs.iter() {
            for (conn, sender) in list {
                tracing::info!(owner = %owner, conn = conn, "sending close frame");
                let _ = sender.send(Message::Close(None));
            }
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for a `Hello` message naming a non-empty owner.
/// 2. Send `Welcome` back.
/// 3. Enter the message loop, applying writes and managing the feed.
/// 4. On disconnect, drop the connection's subscription.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let owner = match wait_for_hello(&mut ws_receiver).await {
        Ok(owner) => owner,
        Err(reason) => {
            tracing::warn!(reason = %reason, "connection rejected before hello");
            let _ = send_store_msg(&mut ws_sender, &StoreMessage::Error { reason }).await;
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    let conn = state.next_conn_id();
    let welcome = StoreMessage::Welcome {
        owner_id: owner.clone(),
    };
    if let Err(e) = send_store_msg(&mut ws_sender, &welcome).await {
        tracing::error!(owner = %owner, error = %e, "failed to send Welcome");
        return;
    }

    tracing::info!(owner = %owner, conn = conn, "client connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer_owner = owner.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(owner = %writer_owner, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_owner = owner.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&reader_owner, conn, &data, &tx, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(owner = %reader_owner, conn = conn, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unsubscribe(&owner, conn).await;
    tracing::info!(owner = %owner, conn = conn, "client disconnected");
}

/// Waits for the first binary message, expecting a `Hello`.
///
/// Returns the declared owner, or the reason the connection is refused.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Result<OwnerId, String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => {
                return match store::decode(&data) {
                    Ok(StoreMessage::Hello { owner_id }) if owner_id.is_blank() => {
                        Err("owner id cannot be empty".to_string())
                    }
                    Ok(StoreMessage::Hello { owner_id }) => Ok(owner_id),
                    Ok(other) => {
                        tracing::warn!(msg = ?other, "expected Hello, got different message");
                        Err("expected Hello".to_string())
                    }
                    Err(e) => Err(format!("failed to decode hello: {e}")),
                };
            }
            Message::Close(_) => return Err("closed before hello".to_string()),
            _ => {
                // Skip non-binary frames (ping/pong) during the handshake.
            }
        }
    }
    Err("closed before hello".to_string())
}

/// Handles a binary WebSocket message from a connected client.
async fn handle_binary_message(
    owner: &OwnerId,
    conn: ConnId,
    data: &[u8],
    tx: &mpsc::UnboundedSender<Message>,
    state: &Arc<ServerState>,
) {
    let msg = match store::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(owner = %owner, error = %e, "failed to decode message");
            reply(
                tx,
                &StoreMessage::Error {
                    reason: format!("malformed frame: {e}"),
                },
            );
            return;
        }
    };

    match msg {
        StoreMessage::Subscribe => {
            let tasks = state.subscribe(owner, conn, tx.clone()).await;
            tracing::info!(owner = %owner, conn = conn, tasks = tasks, "feed subscribed");
        }
        StoreMessage::Unsubscribe => {
            let removed = state.unsubscribe(owner, conn).await;
            tracing::info!(owner = %owner, conn = conn, removed = removed, "feed unsubscribed");
        }
        StoreMessage::Create { request_id, fields } => {
            match state.store.create(owner, fields).await {
                Ok(task) => {
                    tracing::info!(owner = %owner, task_id = %task.id, "task created");
                    reply(tx, &StoreMessage::Created {
                        request_id,
                        id: task.id,
                    });
                    state.broadcast_snapshot(owner).await;
                }
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "create refused");
                    reply(tx, &StoreMessage::Failed {
                        request_id,
                        reason: e.to_failure(),
                    });
                }
            }
        }
        StoreMessage::Update {
            request_id,
            id,
            patch,
        } => match state.store.update(owner, &id, &patch).await {
            Ok(_) => {
                tracing::info!(owner = %owner, task_id = %id, "task updated");
                reply(tx, &StoreMessage::Done { request_id });
                state.broadcast_snapshot(owner).await;
            }
            Err(e) => {
                tracing::warn!(owner = %owner, task_id = %id, error = %e, "update refused");
                reply(tx, &StoreMessage::Failed {
                    request_id,
                    reason: e.to_failure(),
                });
            }
        },
        StoreMessage::Delete { request_id, id } => match state.store.delete(owner, &id).await {
            Ok(_) => {
                tracing::info!(owner = %owner, task_id = %id, "task deleted");
                reply(tx, &StoreMessage::Done { request_id });
                state.broadcast_snapshot(owner).await;
            }
            Err(e) => {
                tracing::warn!(owner = %owner, task_id = %id, error = %e, "delete refused");
                reply(tx, &StoreMessage::Failed {
                    request_id,
                    reason: e.to_failure(),
                });
            }
        },
        StoreMessage::Hello { owner_id } => {
            tracing::warn!(
                owner = %owner,
                new_owner = %owner_id,
                "received duplicate Hello on bound connection"
            );
        }
        other => {
            tracing::warn!(owner = %owner, msg = ?other, "unexpected message type from client");
        }
    }
}

/// Encodes a message and queues it on a connection's writer channel.
fn reply(tx: &mpsc::UnboundedSender<Message>, msg: &StoreMessage) {
    match store::encode(msg) {
        Ok(bytes) => {
            let _ = tx.send(Message::Binary(bytes.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to encode reply"),
    }
}

/// Encodes and sends a store message directly on a WebSocket sender.
async fn send_store_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &StoreMessage,
) -> Result<(), String> {
    let bytes = store::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the store server with a pre-configured [`ServerState`].
///
/// This is the entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "store server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
