//! Fan-out of committed queue mutations to subscribers.
//!
//! The engine hands each committed message to a [`Dispatcher`] handle over
//! a bounded channel; a [`DispatchWorker`] consumes the channel in commit
//! order and delivers to every registered transport. Delivery is decoupled
//! from the engine's critical section: a slow or failing transport can
//! never stall ticket processing, and a committed transition is never
//! rolled back because publishing failed.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::{QueueUpdateMessage, Topic};
use crate::metrics::{DISPATCH_DROPPED, DISPATCH_PUBLISHED, TRANSPORT_FAILURES};

/// Error from a transport delivery attempt.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// The logical publish contract toward the real-time layer.
///
/// Implementations serialize and hand the message to their medium (a
/// broadcast channel feeding WebSocket sessions, a test collector, ...).
/// Delivery is at-least-once; implementations must not block.
pub trait UpdateTransport: Send + Sync {
    /// Short name used in logs and metrics labels.
    fn name(&self) -> &str;

    /// Deliver one message on one topic.
    fn deliver(&self, topic: Topic, message: &QueueUpdateMessage) -> Result<(), TransportError>;
}

/// Handle for publishing committed mutations.
///
/// Cheaply cloneable. Publishing never blocks: if the channel is full the
/// message is logged and dropped rather than backpressuring the engine.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<QueueUpdateMessage>,
}

impl Dispatcher {
    /// Create a dispatcher from a channel sender.
    ///
    /// Most callers want [`create_dispatch_system`]; this is for tests and
    /// custom wiring that hold the receiving end themselves.
    pub fn new(tx: mpsc::Sender<QueueUpdateMessage>) -> Self {
        Self { tx }
    }

    /// Publish one committed mutation.
    pub fn publish(&self, message: QueueUpdateMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {
                DISPATCH_PUBLISHED.inc();
            }
            Err(e) => {
                DISPATCH_DROPPED.inc();
                tracing::error!("Failed to enqueue queue update: {}", e);
            }
        }
    }

    /// A dispatcher wired to nothing, for tests and tools that do not care
    /// about notifications.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

/// Background task delivering published messages to all transports.
pub struct DispatchWorker {
    rx: mpsc::Receiver<QueueUpdateMessage>,
    transports: Vec<Arc<dyn UpdateTransport>>,
}

impl DispatchWorker {
    /// Run until the channel closes (all dispatcher handles dropped).
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Dispatch worker started");

        while let Some(message) = self.rx.recv().await {
            for topic in message.topics() {
                for transport in &self.transports {
                    if let Err(e) = transport.deliver(topic, &message) {
                        TRANSPORT_FAILURES
                            .with_label_values(&[transport.name()])
                            .inc();
                        tracing::warn!(
                            transport = transport.name(),
                            topic = topic.as_str(),
                            ticket_id = %message.ticket_id,
                            "Transport delivery failed: {}",
                            e
                        );
                    }
                }
            }
        }

        tracing::info!("Dispatch worker shutting down");
    }
}

/// Create a connected dispatcher/worker pair.
///
/// Spawn the worker with `tokio::spawn(worker.run())`; clone the handle
/// into whatever publishes.
pub fn create_dispatch_system(
    transports: Vec<Arc<dyn UpdateTransport>>,
    buffer_size: usize,
) -> (Dispatcher, DispatchWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (Dispatcher { tx }, DispatchWorker { rx, transports })
}
