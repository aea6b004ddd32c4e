//! WebSocket server for real-time message notifications
//!
//! Each event is addressed to one user and forwarded only to that user's
//! sockets. Nothing is queued for offline users.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::auth::{IdentityVerifier, UserService};
use crate::error::{ApiError, ApiResult};
use crate::messaging::{Notification, Notifier, NotifyError};

/// Capacity of the fan-out channel; slow sockets skip what they miss.
const CHANNEL_CAPACITY: usize = 256;

/// Encoded event and the user it is meant for
#[derive(Debug, Clone)]
struct Addressed {
    recipient: Uuid,
    payload: Arc<str>,
}

/// Registry of live sockets plus the fan-out channel
#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Addressed>,
    /// Open socket count per user; users without an entry are offline
    connections: Arc<RwLock<HashMap<Uuid, usize>>>,
}

/// Client message types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
}

/// Server message types
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: Uuid },
    Pong,
    Error { message: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of sockets currently open for `user_id`
    pub async fn connections_for(&self, user_id: Uuid) -> usize {
        self.connections
            .read()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Subscribes a socket-less listener to events for `user_id`. Used by the
    /// socket loop and by tests.
    pub fn subscribe(&self, user_id: Uuid) -> impl futures_util::Stream<Item = Arc<str>> {
        let rx = self.tx.subscribe();
        futures_util::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.recipient == user_id => return Some((event.payload, rx)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(user_id = %user_id, skipped, "Notification listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    async fn register_client(&self, user_id: Uuid) {
        let mut connections = self.connections.write().await;
        let open = connections.entry(user_id).or_insert(0);
        *open += 1;
        tracing::info!(user_id = %user_id, open = *open, "Client connected");
    }

    async fn unregister_client(&self, user_id: Uuid) {
        let mut connections = self.connections.write().await;
        let open = match connections.get_mut(&user_id) {
            Some(open) => {
                *open = open.saturating_sub(1);
                *open
            }
            None => 0,
        };
        if open == 0 {
            connections.remove(&user_id);
        }
        tracing::info!(user_id = %user_id, open, "Client disconnected");
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    async fn notify(&self, recipient: Uuid, notification: Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&notification)
            .map_err(|e| NotifyError::Encode(e.to_string()))?;

        if self.connections_for(recipient).await == 0 {
            tracing::debug!(recipient_id = %recipient, "Recipient offline, notification dropped");
            return Ok(());
        }

        self.tx
            .send(Addressed {
                recipient,
                payload: payload.into(),
            })
            .map(|_| ())
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

/// WebSocket handler - authenticates, then upgrades the connection.
/// The token comes from the `Authorization` header or `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<NotificationHub>,
    State(verifier): State<Arc<dyn IdentityVerifier>>,
    State(users): State<Arc<UserService>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<WsQuery>,
) -> ApiResult<Response> {
    let token = bearer
        .map(|TypedHeader(Authorization(b))| b.token().to_string())
        .or(query.token)
        .ok_or_else(|| ApiError::Unauthenticated("Authentication token required".to_string()))?;

    let identity = verifier.verify(&token).await?;
    let user = users
        .find_by_subject(&identity.subject)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found. Please sync first".to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user.id)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, hub: NotificationHub, user_id: Uuid) {
    hub.register_client(user_id).await;
    let (mut sender, mut receiver) = socket.split();

    // Replies produced by the receive loop
    let (internal_tx, mut internal_rx) = mpsc::channel::<ServerMessage>(32);
    let events = hub.subscribe(user_id);

    let mut send_task = tokio::spawn(async move {
        tokio::pin!(events);

        if let Ok(text) = serde_json::to_string(&ServerMessage::Connected { user_id }) {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                Some(payload) = events.next() => {
                    if sender.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(msg) = internal_rx.recv() => {
                    if let Ok(text) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Ping) => ServerMessage::Pong,
                        Err(_) => ServerMessage::Error {
                            message: "Unsupported message".to_string(),
                        },
                    };
                    if internal_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.unregister_client(user_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{Message as ChatMessage, MessageMetadata, MessageType, MessageView};

    fn new_message(conversation_id: Uuid, sender: Uuid) -> Notification {
        Notification::NewMessage {
            conversation_id,
            message: MessageView {
                message: ChatMessage::new(
                    conversation_id,
                    sender,
                    "hello".to_string(),
                    MessageType::Text,
                    MessageMetadata::default(),
                ),
                sender: None,
            },
        }
    }

    #[tokio::test]
    async fn test_notify_without_listeners_is_ok() {
        let hub = NotificationHub::new();
        let result = hub
            .notify(Uuid::new_v4(), new_message(Uuid::new_v4(), Uuid::new_v4()))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_events_reach_only_their_recipient() {
        let hub = NotificationHub::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation_id = Uuid::new_v4();

        hub.register_client(alice).await;
        hub.register_client(bob).await;
        let bobs = hub.subscribe(bob);
        tokio::pin!(bobs);

        hub.notify(alice, new_message(Uuid::new_v4(), bob)).await.unwrap();
        hub.notify(bob, new_message(conversation_id, alice)).await.unwrap();

        let payload = bobs.next().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["conversationId"], conversation_id.to_string());
    }

    #[tokio::test]
    async fn test_offline_recipient_is_not_broadcast() {
        let hub = NotificationHub::new();
        let carol = Uuid::new_v4();
        let mut raw = hub.tx.subscribe();

        hub.notify(carol, new_message(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        assert!(matches!(
            raw.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        hub.register_client(carol).await;
        hub.register_client(carol).await;
        assert_eq!(hub.connections_for(carol).await, 2);
        hub.notify(carol, new_message(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(raw.try_recv().unwrap().recipient, carol);

        hub.unregister_client(carol).await;
        hub.unregister_client(carol).await;
        assert_eq!(hub.connections_for(carol).await, 0);
        hub.notify(carol, new_message(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        assert!(raw.try_recv().is_err());
    }
}
