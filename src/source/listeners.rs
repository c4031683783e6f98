//! Registry of active signal listeners.

use crate::source::types::SignalKind;
use std::collections::BTreeMap;

/// Identifier returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Tracks which signal kinds currently have a registered listener.
///
/// Signals of a kind with no listener are dropped by the monitor, so an
/// empty registry means nothing can reach a detector.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<ListenerId, SignalKind>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: SignalKind) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, kind);
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn is_listening(&self, kind: SignalKind) -> bool {
        self.listeners.values().any(|k| *k == kind)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_remove() {
        let mut registry = ListenerRegistry::new();
        let blur = registry.subscribe(SignalKind::Blur);
        let keys = registry.subscribe(SignalKind::KeyDown);

        assert!(registry.is_listening(SignalKind::Blur));
        assert!(!registry.is_listening(SignalKind::Resize));

        assert!(registry.remove(blur));
        assert!(!registry.remove(blur));
        assert!(!registry.is_listening(SignalKind::Blur));

        assert!(registry.remove(keys));
        assert!(registry.is_empty());
    }
}
