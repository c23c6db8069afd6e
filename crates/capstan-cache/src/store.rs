//! Keyed lookup store.

use std::collections::HashMap;
use std::sync::RwLock;

use capstan_core::Object;
use capstan_store::{EventKind, WatchEvent};

use crate::sink::EventSink;

/// Mapping from object id to its latest observed state.
///
/// All operations are serialized behind a reader-writer lock; a stale
/// watch event never overwrites a newer snapshot.
pub struct KeyedStore<T> {
    objects: RwLock<HashMap<String, T>>,
}

impl<T: Object> Default for KeyedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> KeyedStore<T> {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, T>> {
        self.objects.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, T>> {
        self.objects.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// All objects, ordered by id.
    pub fn list(&self) -> Vec<T> {
        let mut items: Vec<T> = self.read().values().cloned().collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        items
    }

    pub fn insert(&self, obj: T) {
        let mut objects = self.write();
        match objects.get(obj.id()) {
            Some(current) if current.resource_version() > obj.resource_version() => {}
            _ => {
                objects.insert(obj.id().to_string(), obj);
            }
        }
    }

    pub fn delete(&self, id: &str) {
        self.write().remove(id);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<T: Object> EventSink<T> for KeyedStore<T> {
    fn replace(&self, items: &[T]) {
        let mut objects = self.write();
        objects.clear();
        for item in items {
            objects.insert(item.id().to_string(), item.clone());
        }
    }

    fn apply(&self, event: &WatchEvent<T>) {
        match event.kind {
            EventKind::Added | EventKind::Modified => self.insert(event.object.clone()),
            EventKind::Deleted => self.delete(event.object.id()),
        }
    }
}
