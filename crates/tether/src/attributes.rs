//! Concurrent per-session key/value storage.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

/// Type-erased concurrent attribute map attached to each session.
///
/// Values are stored behind `Arc` and recovered with
/// [`Attributes::get_as`]. Writes from handler tasks and reads from
/// application code may race freely; the map provides its own
/// synchronization.
#[derive(Default)]
pub struct Attributes {
    map: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        let _ = self.map.insert(key.into(), Arc::new(value));
    }

    /// Fetch the type-erased value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Fetch the value stored under `key`, downcast to `T`.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    pub fn get_as<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|value| value.downcast::<T>().ok())
    }

    /// Remove the value stored under `key`. Returns whether a value was
    /// present.
    pub fn remove(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    /// Whether a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of stored attributes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attributes")
            .field("len", &self.map.len())
            .finish()
    }
}
