//! The channel's subscription table.
//!
//! Maps `service → key → [subscriber]`. Keys are reference-counted:
//! the wire `track`/`untrack` messages are only warranted on the first
//! subscriber for a key and the removal of the last one, and the
//! connection itself lives exactly as long as the table is non-empty.
//!
//! The table is pure bookkeeping — it never touches the socket — so
//! the reference-counting rules are testable in isolation.

use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked with the `data` payload of every routed message
/// for the subscribed key.
pub type Callback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Identity of one registered callback, used to remove exactly that
/// registration even when the same key has several subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    callback: Callback,
}

/// What a removal did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalEffect {
    /// The id was not registered for that service/key.
    NotFound,
    /// A callback was removed but others remain for the key.
    CallbackRemoved,
    /// The key's last callback was removed; the key is gone and a wire
    /// `untrack` is warranted.
    KeyRemoved,
    /// The key's last callback was removed and no keys remain anywhere:
    /// the connection itself is no longer wanted.
    TableEmpty,
}

/// Subscription bookkeeping for one realtime connection.
#[derive(Default)]
pub struct SubscriptionTable {
    services: HashMap<String, HashMap<String, Vec<Subscriber>>>,
    next_id: u64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a service key.
    ///
    /// Returns the subscriber's id and whether it is the first for the
    /// key (in which case a wire `track` is warranted).
    pub fn add(
        &mut self,
        service: &str,
        key: &str,
        callback: Callback,
    ) -> (SubscriberId, bool) {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;

        let subscribers = self
            .services
            .entry(service.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();
        let first_for_key = subscribers.is_empty();
        subscribers.push(Subscriber { id, callback });
        (id, first_for_key)
    }

    /// Remove one callback by id.
    pub fn remove(&mut self, service: &str, key: &str, id: SubscriberId) -> RemovalEffect {
        let Some(keys) = self.services.get_mut(service) else {
            return RemovalEffect::NotFound;
        };
        let Some(subscribers) = keys.get_mut(key) else {
            return RemovalEffect::NotFound;
        };
        let Some(index) = subscribers.iter().position(|s| s.id == id) else {
            return RemovalEffect::NotFound;
        };

        subscribers.remove(index);
        if !subscribers.is_empty() {
            return RemovalEffect::CallbackRemoved;
        }

        keys.remove(key);
        if keys.is_empty() {
            self.services.remove(service);
        }
        if self.services.is_empty() {
            RemovalEffect::TableEmpty
        } else {
            RemovalEffect::KeyRemoved
        }
    }

    /// Every `(service, key)` currently tracked, for re-tracking after
    /// a reconnect.
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> = self
            .services
            .iter()
            .flat_map(|(service, k)| k.keys().map(move |key| (service.clone(), key.clone())))
            .collect();
        keys.sort();
        keys
    }

    /// Clones of every callback registered for the key.
    ///
    /// Callers invoke these after releasing any lock around the table,
    /// so a callback is free to track or untrack.
    pub fn callbacks_for(&self, service: &str, key: &str) -> Vec<Callback> {
        self.services
            .get(service)
            .and_then(|keys| keys.get(key))
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.callback)).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
