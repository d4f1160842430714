//! The transport worker thread.
//!
//! `run()` binds the listener on the caller's thread (so bind errors surface
//! there), then starts a thread with a current-thread tokio runtime. The loop
//! on that thread is the only place connections are added, removed or
//! written to. Host threads reach it through [`WorkerCommand`]s on an
//! unbounded channel, which never blocks the sender.

use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use livepanel_core::{ClientMessage, LivePanelError, Result, ServerMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{ConnectionHub, WorkerEvent, WorkerStats};
use crate::server::{router, ServerState};
use crate::{Broadcaster, SessionBridge};

const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Messages handed from host threads to the worker loop.
#[derive(Debug)]
pub enum WorkerCommand {
    Broadcast(ServerMessage),
    Shutdown,
}

struct RunningWorker {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    cancel: CancellationToken,
    thread: JoinHandle<()>,
    exited: std_mpsc::Receiver<()>,
    local_addr: SocketAddr,
}

impl RunningWorker {
    fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && !self.thread.is_finished()
    }
}

pub struct TransportWorker {
    bind_addr: String,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
    running: Mutex<Option<RunningWorker>>,
    stats: Arc<WorkerStats>,
}

impl TransportWorker {
    pub fn new(bind_addr: impl Into<String>, startup_timeout: Duration, shutdown_timeout: Duration) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            startup_timeout,
            shutdown_timeout,
            running: Mutex::new(None),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Start the worker if it is not already running.
    ///
    /// Waits up to the startup timeout for the worker to begin accepting;
    /// a slow start is logged, not treated as an error. The state lock is
    /// not held during that wait.
    pub fn run(&self, bridge: Arc<dyn SessionBridge>) -> Result<SocketAddr> {
        let (local_addr, ready) = self.start(bridge)?;
        if let Some(ready) = ready {
            match ready.recv_timeout(self.startup_timeout) {
                Ok(()) => info!(addr = %local_addr, "Transport worker accepting connections"),
                Err(_) => warn!(addr = %local_addr, "Transport worker not ready within startup timeout"),
            }
        }
        Ok(local_addr)
    }

    /// Spawn and install a worker. Returns the readiness receiver, or `None`
    /// when a live worker already exists.
    fn start(&self, bridge: Arc<dyn SessionBridge>) -> Result<(SocketAddr, Option<std_mpsc::Receiver<()>>)> {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if current.is_alive() {
                return Ok((current.local_addr, None));
            }
        }
        // A worker that stopped on its own (client `close`) is reaped here.
        if let Some(stale) = running.take() {
            let _ = stale.thread.join();
        }

        let listener = std::net::TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (exited_tx, exited_rx) = std_mpsc::channel();
        let cancel = CancellationToken::new();

        let ctx = WorkerContext {
            listener,
            bridge,
            commands: commands_rx,
            cancel: cancel.clone(),
            stats: self.stats.clone(),
        };
        let thread = thread::Builder::new()
            .name("livepanel-worker".into())
            .spawn(move || {
                worker_main(ctx, ready_tx);
                let _ = exited_tx.send(());
            })
            .map_err(|e| LivePanelError::Transport(format!("failed to spawn worker: {e}")))?;

        *running = Some(RunningWorker {
            commands: commands_tx,
            cancel,
            thread,
            exited: exited_rx,
            local_addr,
        });
        Ok((local_addr, Some(ready_rx)))
    }

    /// Stop the worker. Idempotent.
    ///
    /// Joins the worker thread for at most the shutdown timeout; a worker
    /// that does not exit by then is abandoned.
    pub fn stop(&self) {
        let Some(worker) = self.running.lock().take() else {
            return;
        };
        worker.cancel.cancel();
        let _ = worker.commands.send(WorkerCommand::Shutdown);

        if worker.thread.thread().id() == thread::current().id() {
            // Called from a callback on the worker thread; it exits once the callback returns.
            debug!("Stop requested from the worker thread");
            return;
        }

        match worker.exited.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if worker.thread.join().is_err() {
                    error!("Transport worker panicked");
                }
                info!("Transport worker stopped");
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Transport worker did not exit in time, abandoning join"
                );
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(RunningWorker::is_alive)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .as_ref()
            .filter(|w| w.is_alive())
            .map(|w| w.local_addr)
    }

    /// Open connections as last recorded by the worker.
    pub fn connection_count(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }
}

impl Broadcaster for TransportWorker {
    fn broadcast(&self, msg: ServerMessage) {
        if let Some(worker) = self.running.lock().as_ref() {
            let _ = worker.commands.send(WorkerCommand::Broadcast(msg));
        }
    }
}

impl Drop for TransportWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    listener: std::net::TcpListener,
    bridge: Arc<dyn SessionBridge>,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
}

fn worker_main(ctx: WorkerContext, ready: std_mpsc::Sender<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(%e, "Failed to build worker runtime");
            return;
        }
    };

    runtime.block_on(worker_loop(ctx, ready));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
}

async fn worker_loop(ctx: WorkerContext, ready: std_mpsc::Sender<()>) {
    let WorkerContext {
        listener,
        bridge,
        mut commands,
        cancel,
        stats,
    } = ctx;

    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(l) => l,
        Err(e) => {
            error!(%e, "Failed to register listener with the runtime");
            cancel.cancel();
            return;
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let app = router(Arc::new(ServerState {
        events: events_tx,
        cancel: cancel.clone(),
        bridge: bridge.clone(),
        stats: stats.clone(),
    }));
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_cancel.cancelled_owned())
            .await
        {
            error!(%e, "WebSocket server error");
        }
    });
    let _ = ready.send(());

    let mut hub = ConnectionHub::new(stats);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(WorkerCommand::Broadcast(msg)) => {
                    hub.broadcast(&msg);
                }
                Some(WorkerCommand::Shutdown) | None => break,
            },
            Some(event) = events_rx.recv() => match event {
                WorkerEvent::Connected { conn_id, tx } => {
                    hub.register(conn_id, tx, &bridge.full_state());
                }
                WorkerEvent::Disconnected { conn_id } => hub.unregister(&conn_id),
                WorkerEvent::Inbound { conn_id, msg } => {
                    let close = msg == ClientMessage::Close;
                    debug!(conn_id = %conn_id, ?msg, "Inbound message");
                    bridge.handle_client_message(msg);
                    if close {
                        info!(conn_id = %conn_id, "Viewer requested shutdown");
                        break;
                    }
                }
            },
        }
    }

    cancel.cancel();
    hub.close_all();
    if tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server).await.is_err() {
        debug!("Server did not drain before shutdown");
    }
}
