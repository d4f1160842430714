//! Observable containers.
//!
//! An [`Observable`] wraps a collection together with an identity token and a
//! style. Clones share the payload. Every mutating method performs the
//! mutation, releases the payload lock and then publishes
//! [`CONTAINER_CHANGED`] with the token. Style builders return a new wrapper
//! that shares payload and token, so a session keeps attributing changes to
//! the same entry after the host swaps in a restyled copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use maud::html;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::{NotificationBus, CONTAINER_CHANGED};
use crate::render::Renderable;

/// Opaque, copy-stable change attribution token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityToken(Uuid);

impl IdentityToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdentityToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered inline CSS declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    declarations: Vec<(String, String)>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing an earlier value for the same property.
    pub fn with(mut self, property: &str, value: &str) -> Self {
        match self.declarations.iter_mut().find(|(p, _)| p == property) {
            Some((_, v)) => *v = value.to_string(),
            None => self.declarations.push((property.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Render as an inline `style` attribute value, `None` when empty.
    pub fn to_css(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(
            self.declarations
                .iter()
                .map(|(p, v)| format!("{p}: {v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

pub struct Observable<C> {
    payload: Arc<RwLock<C>>,
    token: IdentityToken,
    style: Style,
    bus: NotificationBus,
}

pub type ObservableList<T> = Observable<Vec<T>>;
pub type ObservableMap<K, V> = Observable<BTreeMap<K, V>>;
pub type ObservableSet<T> = Observable<BTreeSet<T>>;

impl<C> Clone for Observable<C> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            token: self.token.clone(),
            style: self.style.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for Observable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("token", &self.token)
            .field("style", &self.style)
            .field("payload", &*self.payload.read())
            .finish()
    }
}

impl<C> Observable<C> {
    pub fn new(bus: &NotificationBus, value: C) -> Self {
        Self {
            payload: Arc::new(RwLock::new(value)),
            token: IdentityToken::new(),
            style: Style::default(),
            bus: bus.clone(),
        }
    }

    pub fn token(&self) -> &IdentityToken {
        &self.token
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    /// Read the payload without publishing.
    pub fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.payload.read())
    }

    /// Apply an arbitrary mutation, then publish.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let result = {
            let mut payload = self.payload.write();
            f(&mut payload)
        };
        self.notify();
        result
    }

    fn notify(&self) {
        self.bus.publish(CONTAINER_CHANGED, &self.token);
    }

    /// Copy with one more style declaration. Never publishes.
    pub fn styled(&self, property: &str, value: &str) -> Self {
        Self {
            style: self.style.clone().with(property, value),
            ..self.clone()
        }
    }

    pub fn color(&self, color: &str) -> Self {
        self.styled("color", color)
    }

    pub fn background(&self, color: &str) -> Self {
        self.styled("background", color)
    }

    pub fn bold(&self) -> Self {
        self.styled("font-weight", "bold")
    }

    pub fn font_size(&self, size: &str) -> Self {
        self.styled("font-size", size)
    }
}

impl<T> Observable<Vec<T>> {
    pub fn empty(bus: &NotificationBus) -> Self {
        Self::new(bus, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.payload.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.read().is_empty()
    }

    pub fn push(&self, value: T) {
        self.mutate(|v| v.push(value));
    }

    pub fn pop(&self) -> Option<T> {
        self.mutate(|v| v.pop())
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&self, index: usize, value: T) {
        self.mutate(|v| {
            let index = index.min(v.len());
            v.insert(index, value);
        });
    }

    /// Remove the element at `index`. Out of range returns `None` and does not publish.
    pub fn remove(&self, index: usize) -> Option<T> {
        let removed = {
            let mut payload = self.payload.write();
            (index < payload.len()).then(|| payload.remove(index))
        };
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Replace the element at `index`, returning the old one. Out of range does not publish.
    pub fn set(&self, index: usize, value: T) -> Option<T> {
        let old = {
            let mut payload = self.payload.write();
            payload
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, value))
        };
        if old.is_some() {
            self.notify();
        }
        old
    }

    pub fn clear(&self) {
        self.mutate(|v| v.clear());
    }

    pub fn extend(&self, values: impl IntoIterator<Item = T>) {
        self.mutate(|v| v.extend(values));
    }

    pub fn retain(&self, keep: impl FnMut(&T) -> bool) {
        self.mutate(|v| v.retain(keep));
    }
}

impl<T: Clone> Observable<Vec<T>> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.payload.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.payload.read().clone()
    }
}

impl<T: Ord> Observable<Vec<T>> {
    pub fn sort(&self) {
        self.mutate(|v| v.sort());
    }
}

impl<K: Ord, V> Observable<BTreeMap<K, V>> {
    pub fn empty(bus: &NotificationBus) -> Self {
        Self::new(bus, BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.payload.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.read().is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.payload.read().contains_key(key)
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.mutate(|m| m.insert(key, value))
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.mutate(|m| m.remove(key))
    }

    pub fn clear(&self) {
        self.mutate(|m| m.clear());
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = (K, V)>) {
        self.mutate(|m| m.extend(entries));
    }
}

impl<K: Ord + Clone, V: Clone> Observable<BTreeMap<K, V>> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.payload.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<K, V> {
        self.payload.read().clone()
    }
}

impl<T: Ord> Observable<BTreeSet<T>> {
    pub fn empty(bus: &NotificationBus) -> Self {
        Self::new(bus, BTreeSet::new())
    }

    pub fn len(&self) -> usize {
        self.payload.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.read().is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.payload.read().contains(value)
    }

    pub fn insert(&self, value: T) -> bool {
        self.mutate(|s| s.insert(value))
    }

    pub fn remove(&self, value: &T) -> bool {
        self.mutate(|s| s.remove(value))
    }

    pub fn clear(&self) {
        self.mutate(|s| s.clear());
    }

    pub fn extend(&self, values: impl IntoIterator<Item = T>) {
        self.mutate(|s| s.extend(values));
    }

    /// In-place union.
    pub fn union_with(&self, other: impl IntoIterator<Item = T>) {
        self.extend(other);
    }

    /// In-place intersection.
    pub fn intersect_with(&self, other: &BTreeSet<T>) {
        self.mutate(|s| s.retain(|v| other.contains(v)));
    }

    /// In-place difference.
    pub fn difference_with(&self, other: &BTreeSet<T>) {
        self.mutate(|s| s.retain(|v| !other.contains(v)));
    }
}

impl<T: Ord + Clone> Observable<BTreeSet<T>> {
    pub fn snapshot(&self) -> BTreeSet<T> {
        self.payload.read().clone()
    }
}

impl<T> Renderable for Observable<Vec<T>>
where
    T: fmt::Display + Send + Sync,
{
    fn render(&self) -> String {
        let items = self.payload.read();
        html! {
            ul.lp-list style=[self.style.to_css()] {
                @for item in items.iter() {
                    li { (item.to_string()) }
                }
            }
        }
        .into_string()
    }

    fn kind(&self) -> &str {
        "list"
    }

    fn identity(&self) -> Option<IdentityToken> {
        Some(self.token.clone())
    }
}

impl<K, V> Renderable for Observable<BTreeMap<K, V>>
where
    K: fmt::Display + Send + Sync,
    V: fmt::Display + Send + Sync,
{
    fn render(&self) -> String {
        let entries = self.payload.read();
        html! {
            dl.lp-map style=[self.style.to_css()] {
                @for (key, value) in entries.iter() {
                    dt { (key.to_string()) }
                    dd { (value.to_string()) }
                }
            }
        }
        .into_string()
    }

    fn kind(&self) -> &str {
        "dict"
    }

    fn identity(&self) -> Option<IdentityToken> {
        Some(self.token.clone())
    }
}

impl<T> Renderable for Observable<BTreeSet<T>>
where
    T: fmt::Display + Send + Sync,
{
    fn render(&self) -> String {
        let values = self.payload.read();
        html! {
            ul.lp-set style=[self.style.to_css()] {
                @for value in values.iter() {
                    li { (value.to_string()) }
                }
            }
        }
        .into_string()
    }

    fn kind(&self) -> &str {
        "set"
    }

    fn identity(&self) -> Option<IdentityToken> {
        Some(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_bus() -> (NotificationBus, Arc<AtomicUsize>) {
        let bus = NotificationBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(CONTAINER_CHANGED, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (bus, count)
    }

    #[test]
    fn test_each_list_mutation_publishes_once() {
        let (bus, count) = counting_bus();
        let list = ObservableList::empty(&bus);

        list.push(1);
        list.extend([2, 3]);
        list.insert(0, 0);
        list.set(1, 10);
        list.remove(0);
        list.pop();
        list.retain(|v| *v != 2);
        list.clear();
        assert_eq!(count.load(Ordering::SeqCst), 8);
        assert!(list.is_empty());
    }

    #[test]
    fn test_reads_and_failed_mutations_do_not_publish() {
        let (bus, count) = counting_bus();
        let list = Observable::new(&bus, vec![1, 2, 3]);

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1), Some(2));
        assert_eq!(list.snapshot(), vec![1, 2, 3]);
        assert_eq!(list.remove(10), None);
        assert_eq!(list.set(10, 0), None);
        let _ = list.render();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_styled_copy_shares_token_and_payload() {
        let (bus, count) = counting_bus();
        let list = Observable::new(&bus, vec!["a".to_string()]);
        let styled = list.color("red").bold();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(styled.token(), list.token());
        assert_eq!(styled.style().get("color"), Some("red"));
        assert!(list.style().is_empty());

        list.push("b".into());
        assert_eq!(styled.snapshot(), vec!["a".to_string(), "b".to_string()]);
        assert!(styled.render().contains("color: red; font-weight: bold"));
        assert!(!list.render().contains("style="));
    }

    #[test]
    fn test_distinct_containers_have_distinct_tokens() {
        let bus = NotificationBus::new();
        let a: ObservableList<i32> = ObservableList::empty(&bus);
        let b: ObservableList<i32> = ObservableList::empty(&bus);
        assert_ne!(a.token(), b.token());
        assert_eq!(a.clone().token(), a.token());
    }

    #[test]
    fn test_map_and_set_operations() {
        let (bus, count) = counting_bus();
        let map = ObservableMap::empty(&bus);
        map.insert("cpu", 10);
        map.extend([("mem", 20), ("disk", 30)]);
        map.remove(&"disk");
        assert_eq!(map.get(&"mem"), Some(20));
        assert_eq!(map.len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        let set = ObservableSet::empty(&bus);
        set.extend([1, 2, 3, 4]);
        set.intersect_with(&BTreeSet::from([2, 3, 4, 5]));
        set.difference_with(&BTreeSet::from([4]));
        set.union_with([9]);
        assert_eq!(set.snapshot(), BTreeSet::from([2, 3, 9]));
        assert_eq!(count.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_render_reflects_content_and_escapes() {
        let bus = NotificationBus::new();
        let list = Observable::new(&bus, vec!["<x>".to_string()]);
        assert_eq!(list.render(), r#"<ul class="lp-list"><li>&lt;x&gt;</li></ul>"#);
        assert_eq!(list.kind(), "list");
        assert_eq!(list.identity(), Some(list.token().clone()));

        let map = Observable::new(&bus, BTreeMap::from([("k", 1)]));
        assert_eq!(map.render(), r#"<dl class="lp-map"><dt>k</dt><dd>1</dd></dl>"#);
    }

    #[test]
    fn test_mutation_without_bus_listener_is_fine() {
        let bus = NotificationBus::new();
        let list = ObservableList::empty(&bus);
        list.push(1);
        assert_eq!(list.len(), 1);
    }
}
