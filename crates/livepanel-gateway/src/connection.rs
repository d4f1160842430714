//! WebSocket connection lifecycle: registration, writer task, read loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use livepanel_core::ClientMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::WorkerEvent;
use crate::server::ServerState;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Handle a new WebSocket connection.
///
/// The worker loop owns the connection's sender; this task only forwards
/// queued frames to the socket and parsed frames back to the worker.
pub async fn handle_ws_connection(state: Arc<ServerState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "Viewer connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    if state
        .events
        .send(WorkerEvent::Connected {
            conn_id: conn_id.clone(),
            tx,
        })
        .is_err()
    {
        debug!(conn_id = %conn_id, "Worker already stopped, refusing connection");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    // A failed write ends this task and drops `rx`, so the worker's next
    // send to this connection fails and it is removed.
    let writer_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(msg.into())).await {
                debug!(conn_id = %writer_id, %e, "Write failed");
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(msg) => {
                            let event = WorkerEvent::Inbound {
                                conn_id: conn_id.clone(),
                                msg,
                            };
                            if state.events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(conn_id = %conn_id, %e, "Invalid frame received"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(conn_id = %conn_id, "Viewer closed connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = state.events.send(WorkerEvent::Disconnected {
        conn_id: conn_id.clone(),
    });

    let abort = send_task.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task).await.is_err() {
        abort.abort();
    }
    info!(conn_id = %conn_id, "Viewer disconnected");
}
