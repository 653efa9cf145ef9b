use crate::entity::ConnectionId;
use crate::protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

type Outboxes = HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>;

/// Registry of live connections and the channel feeding each socket's writer.
#[derive(Default)]
pub struct Hub {
    connections: Mutex<Outboxes>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return the receiving end of its outbox.
    pub fn register(&self, id: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        rx
    }

    pub fn unregister(&self, id: &ConnectionId) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to one connection. Returns false when the connection is
    /// unknown or its writer has gone away; nothing is queued in that case.
    pub fn emit(&self, to: &ConnectionId, event: ServerEvent) -> bool {
        let mut connections = self.lock();
        let Some(tx) = connections.get(to) else {
            return false;
        };
        if tx.send(event).is_ok() {
            return true;
        }
        connections.remove(to);
        false
    }

    fn lock(&self) -> MutexGuard<'_, Outboxes> {
        // A poisoned registry still holds valid senders.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
