use std::{collections::HashMap, sync::Arc};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::event::WireEvent;

pub type EventSender = mpsc::UnboundedSender<String>;
pub type EventReceiver = mpsc::UnboundedReceiver<String>;

/// The set of live viewer connections.
///
/// Each subscriber gets an unbounded channel of serialized events, so one
/// stalled WebSocket can never delay delivery to the others. A sender whose
/// receiver is gone is pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, EventSender>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self) -> (Uuid, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.connections.write().await.insert(id, tx);
        (id, rx)
    }

    /// No-op if the connection is already gone.
    pub async fn unsubscribe(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
    }

    /// Best-effort fan-out: the event is serialized once and sent to every
    /// registered connection. Failed sends never stop the loop.
    pub async fn broadcast(&self, event: &WireEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize broadcast event");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let connections = self.connections.read().await;
            for (id, tx) in connections.iter() {
                if tx.send(payload.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in &dead {
                connections.remove(id);
            }
            tracing::debug!(pruned = dead.len(), "removed dead viewer connections");
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}
