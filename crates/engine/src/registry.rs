//! Registry of running algo orders with cooperative cancellation.
//!
//! Long-running commands register themselves here when they start. A cancel
//! request marks matching entries; each command's polling loop observes the
//! flag at the top of its next iteration and runs its cancel hook. Entries
//! are removed once their command reports Finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use model::Side;
use uuid::Uuid;

/// One live algo order.
#[derive(Debug)]
pub struct AlgoEntry {
    pub id: Uuid,
    pub side: Side,
    pub session: Uuid,
    pub tag: String,
    cancelled: AtomicBool,
}

impl AlgoEntry {
    pub fn new(id: Uuid, side: Side, session: Uuid, tag: impl Into<String>) -> Self {
        Self {
            id,
            side,
            session,
            tag: tag.into(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Which algo entries a cancel request targets.
#[derive(Debug, Clone)]
pub enum CancelScope {
    /// Every live entry on the exchange.
    All,
    /// Entries belonging to one session.
    Session(Uuid),
    /// Entries of one session carrying a tag.
    Tag { session: Uuid, tag: String },
    /// One entry by id.
    Id(Uuid),
}

/// Registry of running algo orders, keyed by command id.
#[derive(Debug, Default)]
pub struct AlgoRegistry {
    entries: DashMap<Uuid, Arc<AlgoEntry>>,
}

impl AlgoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: AlgoEntry) -> Arc<AlgoEntry> {
        let entry = Arc::new(entry);
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    pub fn remove(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    /// Whether the entry with this id has been asked to stop.
    ///
    /// Unknown ids report `false`: commands that never registered cannot be
    /// cancelled through the registry.
    pub fn is_cancelled(&self, id: Uuid) -> bool {
        self.entries.get(&id).map(|e| e.is_cancelled()).unwrap_or(false)
    }

    /// Mark all entries matching the scope as cancelled.
    ///
    /// Returns how many entries were newly marked.
    pub fn cancel(&self, scope: &CancelScope) -> usize {
        let mut marked = 0;
        for entry in self.entries.iter() {
            let matches = match scope {
                CancelScope::All => true,
                CancelScope::Session(session) => entry.session == *session,
                CancelScope::Tag { session, tag } => {
                    entry.session == *session && entry.tag == *tag
                }
                CancelScope::Id(id) => entry.id == *id,
            };
            if matches && !entry.is_cancelled() {
                entry.cancel();
                marked += 1;
            }
        }
        marked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session: Uuid, tag: &str) -> AlgoEntry {
        AlgoEntry::new(Uuid::new_v4(), Side::Sell, session, tag)
    }

    #[test]
    fn test_register_and_remove() {
        let registry = AlgoRegistry::new();
        let session = Uuid::new_v4();
        let e = registry.register(entry(session, "a"));

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_cancelled(e.id));

        registry.remove(e.id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_id_not_cancelled() {
        let registry = AlgoRegistry::new();
        assert!(!registry.is_cancelled(Uuid::new_v4()));
    }

    #[test]
    fn test_cancel_by_session() {
        let registry = AlgoRegistry::new();
        let ours = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let a = registry.register(entry(ours, "a"));
        let b = registry.register(entry(ours, "b"));
        let c = registry.register(entry(theirs, "c"));

        let marked = registry.cancel(&CancelScope::Session(ours));
        assert_eq!(marked, 2);
        assert!(registry.is_cancelled(a.id));
        assert!(registry.is_cancelled(b.id));
        assert!(!registry.is_cancelled(c.id));
    }

    #[test]
    fn test_cancel_by_tag() {
        let registry = AlgoRegistry::new();
        let session = Uuid::new_v4();
        let a = registry.register(entry(session, "stop"));
        let b = registry.register(entry(session, "tp"));

        registry.cancel(&CancelScope::Tag { session, tag: "stop".to_string() });
        assert!(registry.is_cancelled(a.id));
        assert!(!registry.is_cancelled(b.id));
    }

    #[test]
    fn test_cancel_all_crosses_sessions() {
        let registry = AlgoRegistry::new();
        let a = registry.register(entry(Uuid::new_v4(), "a"));
        let b = registry.register(entry(Uuid::new_v4(), "b"));

        assert_eq!(registry.cancel(&CancelScope::All), 2);
        assert!(registry.is_cancelled(a.id));
        assert!(registry.is_cancelled(b.id));
    }

    #[test]
    fn test_cancel_twice_counts_once() {
        let registry = AlgoRegistry::new();
        let session = Uuid::new_v4();
        registry.register(entry(session, "a"));

        assert_eq!(registry.cancel(&CancelScope::Session(session)), 1);
        assert_eq!(registry.cancel(&CancelScope::Session(session)), 0);
    }
}
