//! The host-facing session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use livepanel_core::config::Config;
use livepanel_core::{
    ClientMessage, EventKind, ItemState, NotificationBus, PendingEvent, Renderable,
    Result, ServerMessage,
};
use livepanel_gateway::{Broadcaster, SessionBridge, TransportWorker};
use tracing::{debug, info};

use crate::events::EventQueue;
use crate::registry::{ItemRef, Registry};
use crate::window::WindowState;

/// State the worker thread reaches through [`SessionBridge`].
struct SessionInner {
    registry: Arc<Registry>,
    window: WindowState,
    events: EventQueue,
}

impl SessionBridge for SessionInner {
    fn full_state(&self) -> ServerMessage {
        ServerMessage::FullState {
            items: self.registry.get_full_state(),
            window: self.window.config(),
        }
    }

    fn handle_client_message(&self, msg: ClientMessage) {
        match msg {
            ClientMessage::Input { id, event, value } => {
                let pending = self.events.event(&id, event.into(), value);
                match self.registry.get(&id) {
                    Some(item) => {
                        if !item.on_input(&pending) {
                            debug!(item_id = %id, ?event, "Item has no callback for event");
                        }
                    }
                    None => debug!(item_id = %id, "Input for unknown item"),
                }
                self.events.push(pending);
            }
            ClientMessage::WindowEvent { event, width, height } => {
                self.window.handle_event(event, width, height);
            }
            ClientMessage::Close => {
                self.events.push(self.events.event("", EventKind::Close, None));
            }
        }
    }

    fn item_count(&self) -> usize {
        self.registry.len()
    }
}

fn worker_for(config: &Config) -> TransportWorker {
    TransportWorker::new(
        config.bind_addr(),
        config.startup_timeout(),
        config.shutdown_timeout(),
    )
}

/// A live collection of displayed items plus the worker that serves them.
///
/// All methods take `&self` and may be called from any host thread.
pub struct Session {
    inner: Arc<SessionInner>,
    worker: Arc<TransportWorker>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self::with_bus(config, NotificationBus::new())
    }

    /// Build a session on an existing bus, shared with the host's containers.
    pub fn with_bus(config: &Config, bus: NotificationBus) -> Self {
        let worker = Arc::new(worker_for(config));
        let broadcaster: Arc<dyn Broadcaster> = worker.clone();
        Self::assemble(config, bus, broadcaster, worker)
    }

    /// Build a session whose broadcasts go to `broadcaster` instead of the worker.
    pub fn with_broadcaster(config: &Config, bus: NotificationBus, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self::assemble(config, bus, broadcaster, Arc::new(worker_for(config)))
    }

    fn assemble(
        config: &Config,
        bus: NotificationBus,
        broadcaster: Arc<dyn Broadcaster>,
        worker: Arc<TransportWorker>,
    ) -> Self {
        let inner = SessionInner {
            registry: Registry::new(bus, broadcaster.clone()),
            window: WindowState::new(config.window_defaults(), broadcaster),
            events: EventQueue::new(),
        };
        Self {
            inner: Arc::new(inner),
            worker,
        }
    }

    /// The bus containers must be built on to be tracked by this session.
    pub fn bus(&self) -> &NotificationBus {
        self.inner.registry.bus()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn window(&self) -> &WindowState {
        &self.inner.window
    }

    pub fn add<R: Renderable + 'static>(&self, item: R) -> String {
        self.inner.registry.add(item)
    }

    pub fn add_with_id<R: Renderable + 'static>(&self, item: R, id: &str) -> Result<String> {
        self.inner.registry.add_with_id(item, id)
    }

    pub fn update<R: Renderable + 'static>(&self, id: &str, item: R) -> bool {
        self.inner.registry.update(id, item)
    }

    pub fn remove<'a>(&self, target: impl Into<ItemRef<'a>>) -> bool {
        self.inner.registry.remove(target)
    }

    pub fn clear(&self) {
        self.inner.registry.clear();
    }

    pub fn clear_item(&self, id: &str) -> bool {
        self.inner.registry.clear_item(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Renderable>> {
        self.inner.registry.get(id)
    }

    pub fn items(&self) -> Vec<(String, Arc<dyn Renderable>)> {
        self.inner.registry.items()
    }

    pub fn get_full_state(&self) -> Vec<ItemState> {
        self.inner.registry.get_full_state()
    }

    pub fn refresh(&self, id: &str) -> bool {
        self.inner.registry.refresh(id)
    }

    pub fn refresh_all(&self) -> usize {
        self.inner.registry.refresh_all()
    }

    /// Start serving viewers. Returns the bound address.
    pub fn run(&self) -> Result<SocketAddr> {
        let bridge: Arc<dyn SessionBridge> = self.inner.clone();
        self.worker.run(bridge)
    }

    /// Stop the worker, close every connection and clear all entries.
    pub fn stop(&self) {
        self.worker.stop();
        self.inner.registry.reset();
        info!("Session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.worker.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.worker.connection_count()
    }

    /// Block up to `timeout` for the next inbound event.
    pub fn wait_for_event(&self, timeout: Duration) -> Option<PendingEvent> {
        self.inner.events.wait_for_event(timeout)
    }

    /// Drain every queued inbound event without blocking.
    pub fn get_events(&self) -> Vec<PendingEvent> {
        self.inner.events.get_events()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.worker.stop();
        self.inner.registry.unsubscribe();
    }
}
