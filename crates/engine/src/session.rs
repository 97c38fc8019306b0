//! Per-sequence session tracking of broker orders by tag.
//!
//! A session lives for the duration of one command sequence. Commands record
//! the orders they place under their tag, so later commands (and trailing
//! price updates) can find and replace them.

use std::collections::HashMap;

use dashmap::DashMap;
use model::OrderRef;
use uuid::Uuid;

/// Orders recorded during one command sequence, grouped by tag.
#[derive(Debug, Default)]
struct Session {
    tags: HashMap<String, Vec<OrderRef>>,
}

/// All live sessions of one exchange.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session. Called once at the start of a sequence.
    pub fn open(&self, session: Uuid) {
        self.sessions.insert(session, Session::default());
    }

    /// Drop a session and everything recorded in it.
    pub fn close(&self, session: Uuid) {
        self.sessions.remove(&session);
    }

    /// Record a broker order under a tag.
    pub fn record(&self, session: Uuid, tag: &str, order: OrderRef) {
        if let Some(mut s) = self.sessions.get_mut(&session) {
            s.tags.entry(tag.to_string()).or_default().push(order);
        }
    }

    /// Swap an order id after the broker re-issued it at a new price.
    pub fn replace(&self, session: Uuid, tag: &str, old_id: &str, new: OrderRef) {
        if let Some(mut s) = self.sessions.get_mut(&session) {
            if let Some(orders) = s.tags.get_mut(tag) {
                for order in orders.iter_mut() {
                    if order.id == old_id {
                        *order = new;
                        return;
                    }
                }
            }
        }
    }

    /// All orders recorded under a tag, in placement order.
    pub fn orders_for(&self, session: Uuid, tag: &str) -> Vec<OrderRef> {
        self.sessions
            .get(&session)
            .and_then(|s| s.tags.get(tag).cloned())
            .unwrap_or_default()
    }

    /// All orders recorded in the session.
    pub fn all_orders(&self, session: Uuid) -> Vec<OrderRef> {
        self.sessions
            .get(&session)
            .map(|s| s.tags.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let store = SessionStore::new();
        let session = Uuid::new_v4();
        store.open(session);

        store.record(session, "entry", OrderRef::new("o1"));
        store.record(session, "entry", OrderRef::new("o2"));
        store.record(session, "stop", OrderRef::new("o3"));

        assert_eq!(store.orders_for(session, "entry").len(), 2);
        assert_eq!(store.orders_for(session, "stop"), vec![OrderRef::new("o3")]);
        assert_eq!(store.all_orders(session).len(), 3);
    }

    #[test]
    fn test_replace_swaps_id() {
        let store = SessionStore::new();
        let session = Uuid::new_v4();
        store.open(session);
        store.record(session, "stop", OrderRef::new("old"));

        store.replace(session, "stop", "old", OrderRef::new("new"));
        assert_eq!(store.orders_for(session, "stop"), vec![OrderRef::new("new")]);
    }

    #[test]
    fn test_record_into_closed_session_is_noop() {
        let store = SessionStore::new();
        let session = Uuid::new_v4();
        store.open(session);
        store.close(session);

        store.record(session, "entry", OrderRef::new("o1"));
        assert!(store.orders_for(session, "entry").is_empty());
    }

    #[test]
    fn test_unknown_tag_empty() {
        let store = SessionStore::new();
        let session = Uuid::new_v4();
        store.open(session);
        assert!(store.orders_for(session, "nope").is_empty());
    }
}
