//! WebSocket channel to a `zilzzz-store` server.
//!
//! Implements [`RemoteTaskChannel`] over one WebSocket connection bound to
//! one owner. Writes are correlated with their answers by request id; the
//! change feed is routed to the most recent live subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use zilzzz_proto::store::{self, FailureReason, RequestId, StoreMessage};
use zilzzz_proto::task::{OwnerId, Snapshot, Task, TaskFields, TaskId, TaskPatch};

use super::{RemoteError, RemoteTaskChannel, Subscription};

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Active feed target: subscription generation and its sender.
type FeedSlot = Option<(u64, mpsc::UnboundedSender<Snapshot<Task>>)>;

/// State shared between the channel and its background tasks.
#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<StoreMessage>>>,
    feed: Mutex<FeedSlot>,
    connected: AtomicBool,
}

impl Shared {
    /// Drops every waiter and the feed so callers observe the closed
    /// connection instead of hanging.
    fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.pending.lock().clear();
        self.feed.lock().take();
    }
}

/// WebSocket implementation of [`RemoteTaskChannel`].
///
/// Created via [`WsTaskChannel::connect`], which opens the connection,
/// performs the `Hello`/`Welcome` handshake, and spawns a writer task and a
/// reader task. Dropping the channel stops both tasks.
pub struct WsTaskChannel {
    owner: OwnerId,
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    next_request: AtomicU64,
    next_generation: AtomicU64,
    request_timeout: Duration,
    writer_handle: tokio::task::JoinHandle<()>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl WsTaskChannel {
    /// Connect to a store server and bind the connection to `owner`.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::Timeout`] if the connection or handshake times out.
    /// - [`RemoteError::Forbidden`] if the server refuses the owner.
    /// - [`RemoteError::ConnectionClosed`] if the server hangs up during
    ///   the handshake.
    /// - [`RemoteError::Io`] if the URL cannot be reached.
    pub async fn connect(
        url: &str,
        owner: OwnerId,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url = url, "store connect timed out");
                RemoteError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = url, error = %e, "store connect failed");
                RemoteError::Io(std::io::Error::other(format!("connect to {url} failed: {e}")))
            })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let hello = store::encode(&StoreMessage::Hello {
            owner_id: owner.clone(),
        })?;
        ws_sender
            .send(Message::Binary(hello.into()))
            .await
            .map_err(|e| {
                RemoteError::Io(std::io::Error::other(format!("failed to send Hello: {e}")))
            })?;

        let ack = tokio::time::timeout(connect_timeout, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = url, "store handshake timed out");
                RemoteError::Timeout
            })?;

        match ack {
            Some(Ok(Message::Binary(data))) => match store::decode(&data)? {
                StoreMessage::Welcome { owner_id } if owner_id == owner => {
                    tracing::info!(owner = %owner_id, url = url, "connected to task store");
                }
                StoreMessage::Error { reason } => {
                    tracing::warn!(reason = %reason, "store refused connection");
                    return Err(RemoteError::Forbidden(reason));
                }
                other => {
                    tracing::warn!(?other, "unexpected store response during handshake");
                    return Err(RemoteError::Rejected(
                        "unexpected response during handshake".to_string(),
                    ));
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("store closed connection during handshake");
                return Err(RemoteError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                return Err(RemoteError::Rejected(
                    "unexpected non-binary frame during handshake".to_string(),
                ));
            }
            Some(Err(e)) => {
                return Err(RemoteError::Io(std::io::Error::other(format!(
                    "WebSocket error during handshake: {e}"
                ))));
            }
        }

        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::Relaxed);

        let (outgoing, rx) = mpsc::unbounded_channel();
        let writer_handle = tokio::spawn(writer_loop(ws_sender, rx, Arc::clone(&shared)));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, Arc::clone(&shared)));

        Ok(Self {
            owner,
            url: url.to_string(),
            outgoing,
            shared,
            next_request: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            request_timeout,
            writer_handle,
            reader_handle,
        })
    }

    /// The owner this connection is bound to.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The store URL this channel is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the WebSocket connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    fn send_frame(&self, msg: &StoreMessage) -> Result<(), RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::ConnectionClosed);
        }
        let bytes = store::encode(msg)?;
        self.outgoing
            .send(Message::Binary(bytes.into()))
            .map_err(|_| RemoteError::ConnectionClosed)
    }

    /// Sends a request and waits for its answer.
    async fn request(
        &self,
        build: impl FnOnce(RequestId) -> StoreMessage + Send,
    ) -> Result<StoreMessage, RemoteError> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, tx);

        if let Err(e) = self.send_frame(&build(request_id)) {
            self.shared.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(RemoteError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.lock().remove(&request_id);
                tracing::warn!(request_id = request_id, "store request timed out");
                Err(RemoteError::Timeout)
            }
        }
    }
}

impl Drop for WsTaskChannel {
    fn drop(&mut self) {
        self.writer_handle.abort();
        self.reader_handle.abort();
    }
}

impl RemoteTaskChannel for WsTaskChannel {
    /// Start the owner's feed.
    ///
    /// A newer subscription replaces an older one on the same connection;
    /// the older one's feed ends.
    async fn subscribe(&self, owner: &OwnerId) -> Result<Subscription<Task>, RemoteError> {
        if *owner != self.owner {
            return Err(RemoteError::Forbidden(format!(
                "connection for {} cannot subscribe for {owner}",
                self.owner
            )));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.feed.lock() = Some((generation, tx));

        if let Err(e) = self.send_frame(&StoreMessage::Subscribe) {
            self.shared.feed.lock().take();
            return Err(e);
        }
        tracing::info!(owner = %owner, "task feed subscribed");

        let shared = Arc::clone(&self.shared);
        let outgoing = self.outgoing.clone();
        Ok(Subscription::with_release(rx, move || {
            let mut feed = shared.feed.lock();
            if feed.as_ref().is_some_and(|(g, _)| *g == generation) {
                feed.take();
                drop(feed);
                if let Ok(bytes) = store::encode(&StoreMessage::Unsubscribe) {
                    let _ = outgoing.send(Message::Binary(bytes.into()));
                }
                tracing::debug!("task feed released");
            }
        }))
    }

    async fn create(&self, fields: TaskFields) -> Result<TaskId, RemoteError> {
        let answer = self
            .request(|request_id| StoreMessage::Create { request_id, fields })
            .await?;
        match answer {
            StoreMessage::Created { id, .. } => Ok(id),
            StoreMessage::Failed { reason, .. } => Err(map_failure(reason, None)),
            other => Err(unexpected(&other)),
        }
    }

    async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), RemoteError> {
        let target = id.clone();
        let answer = self
            .request(|request_id| StoreMessage::Update {
                request_id,
                id: target,
                patch,
            })
            .await?;
        match answer {
            StoreMessage::Done { .. } => Ok(()),
            StoreMessage::Failed { reason, .. } => Err(map_failure(reason, Some(id))),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let target = id.clone();
        let answer = self
            .request(|request_id| StoreMessage::Delete {
                request_id,
                id: target,
            })
            .await?;
        match answer {
            StoreMessage::Done { .. } => Ok(()),
            StoreMessage::Failed { reason, .. } => Err(map_failure(reason, Some(id))),
            other => Err(unexpected(&other)),
        }
    }
}

fn map_failure(reason: FailureReason, id: Option<&TaskId>) -> RemoteError {
    match (reason, id) {
        (FailureReason::NotFound, Some(id)) => RemoteError::NotFound(id.clone()),
        (FailureReason::NotFound, None) => RemoteError::Rejected("not found".to_string()),
        (FailureReason::Forbidden, _) => RemoteError::Forbidden("owner mismatch".to_string()),
        (FailureReason::Invalid(reason) | FailureReason::Storage(reason), _) => {
            RemoteError::Rejected(reason)
        }
    }
}

fn unexpected(msg: &StoreMessage) -> RemoteError {
    tracing::warn!(?msg, "unexpected answer from store");
    RemoteError::Rejected("unexpected answer from store".to_string())
}

/// Background task that forwards queued frames to the WebSocket.
async fn writer_loop(
    mut ws_sender: WsSender,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = ws_sender.send(msg).await {
            tracing::warn!(error = %e, "store WebSocket write failed");
            break;
        }
    }
    shared.close();
}

/// Background task that reads frames and dispatches them.
///
/// Snapshots go to the active subscription; answers go to the waiting
/// request. Malformed frames are logged and skipped.
async fn reader_loop(mut ws_reader: WsReader, shared: Arc<Shared>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match store::decode(&data) {
                Ok(StoreMessage::Snapshot { tasks }) => {
                    let mut feed = shared.feed.lock();
                    let delivered = feed
                        .as_ref()
                        .is_some_and(|(_, tx)| tx.send(Snapshot::new(tasks)).is_ok());
                    if !delivered && feed.is_some() {
                        // Receiver gone without running its release hook.
                        feed.take();
                    }
                }
                Ok(answer) if answer.request_id().is_some() => {
                    let waiter = answer
                        .request_id()
                        .and_then(|id| shared.pending.lock().remove(&id));
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(answer);
                        }
                        None => tracing::debug!(?answer, "answer for unknown request"),
                    }
                }
                Ok(StoreMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "store error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected store message type");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed store frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("store WebSocket closed by server");
                break;
            }
            Ok(_) => {
                // Ignore ping/pong/text/raw frames.
            }
            Err(e) => {
                tracing::warn!(error = %e, "store WebSocket read error");
                break;
            }
        }
    }
    shared.close();
    tracing::info!("store reader task exiting");
}
