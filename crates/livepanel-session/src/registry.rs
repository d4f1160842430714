//! The item registry.
//!
//! Holds the ordered entries, the per-kind id counters and the
//! token -> id map behind one mutex. Every method holds the lock only for its
//! state change; rendering and the hand-off to the broadcaster happen after
//! it is released.
//!
//! Methods that broadcast also hold a separate dispatch lock from before the
//! state change until the hand-off returns, so hand-offs leave in the same
//! order as the state changes they describe, across host threads.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use livepanel_core::{
    IdentityToken, ItemState, LivePanelError, NotificationBus, Renderable, Result, ServerMessage,
    SubscriptionId, CONTAINER_CHANGED,
};
use livepanel_gateway::Broadcaster;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Target of a removal: an item id or a displayed container's token.
#[derive(Debug, Clone, Copy)]
pub enum ItemRef<'a> {
    Id(&'a str),
    Token(&'a IdentityToken),
}

impl<'a> From<&'a str> for ItemRef<'a> {
    fn from(id: &'a str) -> Self {
        ItemRef::Id(id)
    }
}

impl<'a> From<&'a String> for ItemRef<'a> {
    fn from(id: &'a String) -> Self {
        ItemRef::Id(id)
    }
}

impl<'a> From<&'a IdentityToken> for ItemRef<'a> {
    fn from(token: &'a IdentityToken) -> Self {
        ItemRef::Token(token)
    }
}

struct Entry {
    id: String,
    item: Arc<dyn Renderable>,
    token: Option<IdentityToken>,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<Entry>,
    counters: HashMap<String, u64>,
    tokens: HashMap<IdentityToken, String>,
}

impl RegistryState {
    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Next free `"{kind}_{n}"` id. Skips ids a caller already claimed explicitly.
    fn next_id(&mut self, kind: &str) -> String {
        loop {
            let counter = self.counters.entry(kind.to_string()).or_insert(0);
            *counter += 1;
            let id = format!("{kind}_{counter}");
            if self.position(&id).is_none() {
                return id;
            }
        }
    }

    fn bind_token(&mut self, token: &Option<IdentityToken>, id: &str) {
        if let Some(token) = token {
            if let Some(previous) = self.tokens.insert(token.clone(), id.to_string()) {
                if previous != id {
                    debug!(item_id = %id, previous = %previous, "Container re-bound to newer entry");
                }
            }
        }
    }

    /// Release `token` only while it still points at `id`.
    fn release_token(&mut self, token: &Option<IdentityToken>, id: &str) {
        if let Some(token) = token {
            if self.tokens.get(token).is_some_and(|bound| bound == id) {
                self.tokens.remove(token);
            }
        }
    }

    fn remove_at(&mut self, index: usize) -> Entry {
        let entry = self.entries.remove(index);
        self.release_token(&entry.token, &entry.id);
        entry
    }
}

pub struct Registry {
    state: Mutex<RegistryState>,
    /// Taken before `state`; never held while waiting on the network.
    dispatch: Mutex<()>,
    bus: NotificationBus,
    broadcaster: Arc<dyn Broadcaster>,
    subscription: Mutex<Option<SubscriptionId>>,
    weak_self: Weak<Registry>,
}

impl Registry {
    pub fn new(bus: NotificationBus, broadcaster: Arc<dyn Broadcaster>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(RegistryState::default()),
            dispatch: Mutex::new(()),
            bus,
            broadcaster,
            subscription: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Add an item under an auto-generated id.
    pub fn add<R: Renderable + 'static>(&self, item: R) -> String {
        // Auto ids never collide, so this cannot fail.
        match self.insert(Arc::new(item), None) {
            Ok(id) => id,
            Err(_) => unreachable!("generated ids are unique"),
        }
    }

    /// Add an item under a caller-chosen id. A live duplicate is a usage error.
    pub fn add_with_id<R: Renderable + 'static>(&self, item: R, id: &str) -> Result<String> {
        self.insert(Arc::new(item), Some(id))
    }

    /// Add an already shared item, optionally under a caller-chosen id.
    pub fn add_shared(&self, item: Arc<dyn Renderable>, id: Option<&str>) -> Result<String> {
        self.insert(item, id)
    }

    fn insert(&self, item: Arc<dyn Renderable>, id: Option<&str>) -> Result<String> {
        let token = item.identity();
        let _dispatch = self.dispatch.lock();
        let id = {
            let mut state = self.state.lock();
            let id = match id {
                Some(id) if state.position(id).is_some() => {
                    return Err(LivePanelError::DuplicateId(id.to_string()));
                }
                Some(id) => id.to_string(),
                None => state.next_id(item.kind()),
            };
            state.bind_token(&token, &id);
            state.entries.push(Entry {
                id: id.clone(),
                item: item.clone(),
                token: token.clone(),
            });
            id
        };

        if token.is_some() {
            self.ensure_subscribed();
        }
        debug!(item_id = %id, "Item added");
        self.broadcaster.broadcast(ServerMessage::Add {
            id: id.clone(),
            html: item.render(),
        });
        Ok(id)
    }

    /// Replace an entry's item in place. Returns false for an unknown id.
    pub fn update<R: Renderable + 'static>(&self, id: &str, item: R) -> bool {
        self.update_shared(id, Arc::new(item))
    }

    pub fn update_shared(&self, id: &str, item: Arc<dyn Renderable>) -> bool {
        let token = item.identity();
        let _dispatch = self.dispatch.lock();
        {
            let mut state = self.state.lock();
            let Some(index) = state.position(id) else {
                return false;
            };
            let old_token = state.entries[index].token.take();
            state.release_token(&old_token, id);
            state.bind_token(&token, id);
            let entry = &mut state.entries[index];
            entry.item = item.clone();
            entry.token = token.clone();
        }

        if token.is_some() {
            self.ensure_subscribed();
        }
        debug!(item_id = %id, "Item updated");
        self.broadcaster.broadcast(ServerMessage::Update {
            id: id.to_string(),
            html: item.render(),
        });
        true
    }

    /// Remove an entry by id or by container token. Returns false if not found.
    pub fn remove<'a>(&self, target: impl Into<ItemRef<'a>>) -> bool {
        let _dispatch = self.dispatch.lock();
        let removed = {
            let mut state = self.state.lock();
            let index = match target.into() {
                ItemRef::Id(id) => state.position(id),
                ItemRef::Token(token) => state
                    .tokens
                    .get(token)
                    .cloned()
                    .and_then(|id| state.position(&id)),
            };
            index.map(|i| state.remove_at(i))
        };

        let Some(entry) = removed else {
            return false;
        };
        debug!(item_id = %entry.id, "Item removed");
        self.broadcaster.broadcast(ServerMessage::Remove { id: entry.id });
        true
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let _dispatch = self.dispatch.lock();
        {
            let mut state = self.state.lock();
            state.entries.clear();
            state.tokens.clear();
        }
        debug!("Registry cleared");
        self.broadcaster.broadcast(ServerMessage::Clear);
    }

    /// Remove a single entry; same as [`remove`](Self::remove) by id.
    pub fn clear_item(&self, id: &str) -> bool {
        self.remove(id)
    }

    /// Drop all entries without broadcasting. Used when the session stops.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.tokens.clear();
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Renderable>> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.item.clone())
    }

    /// Snapshot of `(id, item)` pairs in display order.
    pub fn items(&self) -> Vec<(String, Arc<dyn Renderable>)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| (e.id.clone(), e.item.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Current markup of every entry, in order.
    pub fn get_full_state(&self) -> Vec<ItemState> {
        self.items()
            .into_iter()
            .map(|(id, item)| ItemState {
                html: item.render(),
                id,
            })
            .collect()
    }

    /// Re-render and re-broadcast one entry. Returns false for an unknown id.
    pub fn refresh(&self, id: &str) -> bool {
        let _dispatch = self.dispatch.lock();
        let Some(item) = self.get(id) else {
            return false;
        };
        self.broadcaster.broadcast(ServerMessage::Update {
            id: id.to_string(),
            html: item.render(),
        });
        true
    }

    /// Re-render and re-broadcast every entry. Returns how many were sent.
    pub fn refresh_all(&self) -> usize {
        let _dispatch = self.dispatch.lock();
        let items = self.items();
        let count = items.len();
        for (id, item) in items {
            self.broadcaster.broadcast(ServerMessage::Update {
                html: item.render(),
                id,
            });
        }
        count
    }

    fn on_container_changed(&self, token: &IdentityToken) {
        let _dispatch = self.dispatch.lock();
        let target = {
            let state = self.state.lock();
            state.tokens.get(token).and_then(|id| {
                state
                    .entries
                    .iter()
                    .find(|e| &e.id == id)
                    .map(|e| (e.id.clone(), e.item.clone()))
            })
        };

        let Some((id, item)) = target else {
            trace!(%token, "Change from a container that is not displayed");
            return;
        };
        self.broadcaster.broadcast(ServerMessage::Update {
            id,
            html: item.render(),
        });
    }

    fn ensure_subscribed(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        *subscription = Some(self.bus.subscribe(CONTAINER_CHANGED, move |token| {
            if let Some(registry) = weak.upgrade() {
                registry.on_container_changed(token);
            }
        }));
    }

    pub(crate) fn unsubscribe(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
