//! Connection bookkeeping and broadcast relay. Lives on the worker thread only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use livepanel_core::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Notifications from connection tasks to the worker loop.
#[derive(Debug)]
pub enum WorkerEvent {
    Connected {
        conn_id: String,
        tx: mpsc::UnboundedSender<String>,
    },
    Disconnected {
        conn_id: String,
    },
    Inbound {
        conn_id: String,
        msg: ClientMessage,
    },
}

/// Counters shared with host threads and the `/health` route.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub connections: AtomicUsize,
}

/// Open connections, keyed by connection id.
pub struct ConnectionHub {
    connections: HashMap<String, mpsc::UnboundedSender<String>>,
    stats: Arc<WorkerStats>,
}

impl ConnectionHub {
    pub fn new(stats: Arc<WorkerStats>) -> Self {
        Self {
            connections: HashMap::new(),
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a connection and send it the bootstrap message first.
    pub fn register(&mut self, conn_id: String, tx: mpsc::UnboundedSender<String>, bootstrap: &ServerMessage) {
        match serde_json::to_string(bootstrap) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    debug!(conn_id = %conn_id, "Connection gone before bootstrap");
                    return;
                }
            }
            Err(e) => {
                error!(%e, "Failed to serialize full state");
                return;
            }
        }
        self.connections.insert(conn_id, tx);
        self.sync_stats();
    }

    pub fn unregister(&mut self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            self.sync_stats();
        }
    }

    /// Send a message to every open connection.
    ///
    /// A failed send drops that connection only. Returns how many received it.
    pub fn broadcast(&mut self, message: &ServerMessage) -> usize {
        let msg = match serde_json::to_string(message) {
            Ok(m) => m,
            Err(e) => {
                error!(%e, "Failed to serialize broadcast");
                return 0;
            }
        };

        self.connections.retain(|conn_id, tx| {
            let ok = tx.send(msg.clone()).is_ok();
            if !ok {
                warn!(conn_id = %conn_id, "Dropping dead connection");
            }
            ok
        });
        self.sync_stats();

        let sent = self.connections.len();
        debug!(item_id = message.item_id().unwrap_or("-"), sent, "Broadcast");
        sent
    }

    /// Drop every connection; their writer tasks close the sockets.
    pub fn close_all(&mut self) {
        self.connections.clear();
        self.sync_stats();
    }

    fn sync_stats(&self) {
        self.stats
            .connections
            .store(self.connections.len(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> (ConnectionHub, Arc<WorkerStats>) {
        let stats = Arc::new(WorkerStats::default());
        (ConnectionHub::new(stats.clone()), stats)
    }

    #[test]
    fn test_register_sends_bootstrap_first() {
        let (mut hub, stats) = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("c1".into(), tx, &ServerMessage::Clear);
        hub.broadcast(&ServerMessage::Remove { id: "a".into() });

        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"clear"}"#);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"remove","id":"a"}"#);
        assert_eq!(stats.connections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dead_connection_dropped_others_still_served() {
        let (mut hub, stats) = hub();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register("dead".into(), tx1, &ServerMessage::Clear);
        hub.register("live".into(), tx2, &ServerMessage::Clear);
        drop(rx1);

        let sent = hub.broadcast(&ServerMessage::Update {
            id: "x".into(),
            html: "1".into(),
        });
        assert_eq!(sent, 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(stats.connections.load(Ordering::SeqCst), 1);

        assert_eq!(rx2.try_recv().unwrap(), r#"{"type":"clear"}"#);
        assert!(rx2.try_recv().unwrap().contains(r#""type":"update""#));
    }

    #[test]
    fn test_register_skips_closed_connection() {
        let (mut hub, _) = hub();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        hub.register("c".into(), tx, &ServerMessage::Clear);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_unregister_and_close_all() {
        let (mut hub, stats) = hub();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        hub.register("a".into(), tx1, &ServerMessage::Clear);
        hub.register("b".into(), tx2, &ServerMessage::Clear);
        hub.unregister("a");
        hub.unregister("a");
        assert_eq!(hub.len(), 1);
        hub.close_all();
        assert!(hub.is_empty());
        assert_eq!(stats.connections.load(Ordering::SeqCst), 0);
    }
}
