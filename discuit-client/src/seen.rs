use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Remembers which item keys the watch loops have already dispatched.
///
/// Async so that a persistent backing store can be dropped in; the default
/// [`MemorySeenChecker`] never suspends. The in-memory set has no eviction
/// and grows for the lifetime of the client; a long-running process watching
/// busy communities should supply a bounded implementation.
#[async_trait]
pub trait SeenChecker: Send + Sync {
    /// Marks a key as seen. Adding a key twice is a no-op.
    async fn add(&self, key: &str);

    /// Returns whether the key has been seen.
    async fn is_seen(&self, key: &str) -> bool;
}

/// Seen checker that stores keys in memory.
#[derive(Debug, Default)]
pub struct MemorySeenChecker {
    seen: Mutex<HashSet<String>>,
}

impl MemorySeenChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("seen set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SeenChecker for MemorySeenChecker {
    async fn add(&self, key: &str) {
        self.seen
            .lock()
            .expect("seen set lock poisoned")
            .insert(key.to_string());
    }

    async fn is_seen(&self, key: &str) -> bool {
        self.seen
            .lock()
            .expect("seen set lock poisoned")
            .contains(key)
    }
}
