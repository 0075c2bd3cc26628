//! WebSocket support for real-time dashboard updates.
//!
//! The dispatcher delivers committed queue updates into per-topic broadcast
//! channels here; each connected client holds a subscription to one topic.
//! A lagging client skips messages and is warned about, it never
//! backpressures the engine.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use triage_core::{QueueUpdateMessage, Topic, TransportError, UpdateTransport};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Broadcaster bridging the core dispatcher to WebSocket sessions.
///
/// One broadcast channel per logical topic. Registered with the dispatch
/// worker as an [`UpdateTransport`].
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    queue_updates: broadcast::Sender<QueueUpdateMessage>,
    retry_queue: broadcast::Sender<QueueUpdateMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given per-topic channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (queue_updates, _) = broadcast::channel(capacity);
        let (retry_queue, _) = broadcast::channel(capacity);
        Self {
            queue_updates,
            retry_queue,
        }
    }

    /// Subscribe to one topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<QueueUpdateMessage> {
        match topic {
            Topic::QueueUpdates => self.queue_updates.subscribe(),
            Topic::RetryQueue => self.retry_queue.subscribe(),
        }
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl UpdateTransport for WsBroadcaster {
    fn name(&self) -> &str {
        "websocket"
    }

    fn deliver(&self, topic: Topic, message: &QueueUpdateMessage) -> Result<(), TransportError> {
        let sender = match topic {
            Topic::QueueUpdates => &self.queue_updates,
            Topic::RetryQueue => &self.retry_queue,
        };
        // Send errors just mean no one is listening on this topic
        let _ = sender.send(message.clone());
        Ok(())
    }
}

/// Upgrade handler for the general queue-updates topic.
pub async fn ws_queue_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.ws_broadcaster().subscribe(Topic::QueueUpdates);
    ws.on_upgrade(move |socket| handle_socket(socket, rx, Topic::QueueUpdates))
}

/// Upgrade handler for the retry-queue topic.
pub async fn ws_retry_queue_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.ws_broadcaster().subscribe(Topic::RetryQueue);
    ws.on_upgrade(move |socket| handle_socket(socket, rx, Topic::RetryQueue))
}

/// Handle a single WebSocket connection subscribed to one topic.
async fn handle_socket(
    socket: WebSocket,
    mut rx: broadcast::Receiver<QueueUpdateMessage>,
    topic: Topic,
) {
    let (mut sender, mut receiver) = socket.split();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!(topic = topic.as_str(), "WebSocket client connected");

    // Forward broadcast messages to this client
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT
                        .with_label_values(&[topic.as_str(), msg.action.as_str()])
                        .inc();

                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to serialize queue update: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                    // Continue receiving - the client will catch up
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                // We don't expect any client messages, but log them
                debug!("Received text message: {}", text);
            }
            Ok(_) => {
                // Ignore other message types
            }
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // Clean up
    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!(topic = topic.as_str(), "WebSocket client disconnected");
}
