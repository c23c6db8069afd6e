//! In-memory watchable registry.
//!
//! One registry holds one resource kind behind a mutex, assigns monotonic
//! resource versions, and fans writes out to watch subscribers. Updates
//! are compare-and-set; validation hooks run on every write. This backs
//! the standalone daemon and all tests; a persistent registry would sit
//! behind the same `ResourceClient` trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capstan_core::validation::ValidationError;
use capstan_core::{LabelSelector, Object};
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::ResourceClient;
use crate::error::{StoreError, StoreResult};
use crate::event::{EventKind, WatchEvent, WatchStream};

/// Validation hook applied on create and update.
pub type Validator<T> = fn(&T) -> Result<(), ValidationError>;

struct Shared<T> {
    state: Mutex<State<T>>,
    version: AtomicU64,
    validator: Option<Validator<T>>,
}

struct State<T> {
    objects: HashMap<String, T>,
    subscribers: Vec<mpsc::UnboundedSender<WatchEvent<T>>>,
    closed: bool,
}

/// Thread-safe in-memory registry for one resource kind.
pub struct MemoryRegistry<T: Object> {
    shared: Arc<Shared<T>>,
}

impl<T: Object> Clone for MemoryRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Object> Default for MemoryRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> MemoryRegistry<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    objects: HashMap::new(),
                    subscribers: Vec::new(),
                    closed: false,
                }),
                version: AtomicU64::new(0),
                validator: None,
            }),
        }
    }

    /// Registry that applies `validator` on every create and update.
    pub fn with_validator(validator: Validator<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    objects: HashMap::new(),
                    subscribers: Vec::new(),
                    closed: false,
                }),
                version: AtomicU64::new(0),
                validator: Some(validator),
            }),
        }
    }

    /// Drops every watch subscription; subsequent watches fail with
    /// `Closed`. Reads and writes keep working (tests inspect final state
    /// after shutdown).
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
        debug!(kind = T::KIND, "registry watches closed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_version(&self) -> u64 {
        self.shared.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn validate(&self, obj: &T) -> StoreResult<()> {
        if let Some(validator) = self.shared.validator {
            validator(obj)?;
        }
        Ok(())
    }

    fn notify(state: &mut State<T>, kind: EventKind, object: &T) {
        state.subscribers.retain(|tx| {
            tx.send(WatchEvent {
                kind,
                object: object.clone(),
            })
            .is_ok()
        });
    }
}

#[async_trait]
impl<T: Object> ResourceClient<T> for MemoryRegistry<T> {
    async fn list(&self, selector: &LabelSelector) -> StoreResult<(Vec<T>, u64)> {
        let state = self.lock();
        let mut items: Vec<T> = state
            .objects
            .values()
            .filter(|obj| selector.matches(obj.labels()))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        Ok((items, self.shared.version.load(Ordering::SeqCst)))
    }

    async fn get(&self, id: &str) -> StoreResult<T> {
        let state = self.lock();
        state.objects.get(id).cloned().ok_or(StoreError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    async fn create(&self, mut obj: T) -> StoreResult<T> {
        self.validate(&obj)?;
        let mut state = self.lock();
        if state.objects.contains_key(obj.id()) {
            return Err(StoreError::AlreadyExists {
                kind: T::KIND,
                id: obj.id().to_string(),
            });
        }
        obj.set_resource_version(self.next_version());
        state.objects.insert(obj.id().to_string(), obj.clone());
        Self::notify(&mut state, EventKind::Added, &obj);
        debug!(kind = T::KIND, id = obj.id(), rv = obj.resource_version(), "created");
        Ok(obj)
    }

    async fn update(&self, mut obj: T) -> StoreResult<T> {
        self.validate(&obj)?;
        let mut state = self.lock();
        let stored_rv = match state.objects.get(obj.id()) {
            Some(stored) => stored.resource_version(),
            None => {
                return Err(StoreError::NotFound {
                    kind: T::KIND,
                    id: obj.id().to_string(),
                })
            }
        };
        if obj.resource_version() != 0 && obj.resource_version() != stored_rv {
            return Err(StoreError::Conflict {
                kind: T::KIND,
                id: obj.id().to_string(),
                expected: stored_rv,
                actual: obj.resource_version(),
            });
        }
        obj.set_resource_version(self.next_version());
        state.objects.insert(obj.id().to_string(), obj.clone());
        Self::notify(&mut state, EventKind::Modified, &obj);
        debug!(kind = T::KIND, id = obj.id(), rv = obj.resource_version(), "updated");
        Ok(obj)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut state = self.lock();
        match state.objects.remove(id) {
            Some(obj) => {
                Self::notify(&mut state, EventKind::Deleted, &obj);
                debug!(kind = T::KIND, id, "deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            }),
        }
    }

    async fn watch(&self, _resource_version: u64) -> StoreResult<WatchStream<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        Ok(WatchStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::validation::validate_deployment_config;
    use capstan_core::DeploymentConfig;

    fn config(id: &str) -> DeploymentConfig {
        DeploymentConfig {
            id: id.to_string(),
            ..DeploymentConfig::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_monotonic_versions() {
        let registry = MemoryRegistry::new();
        let a = registry.create(config("a")).await.unwrap();
        let b = registry.create(config("b")).await.unwrap();
        assert!(a.resource_version > 0);
        assert!(b.resource_version > a.resource_version);
    }

    #[tokio::test]
    async fn create_duplicate_fails() {
        let registry = MemoryRegistry::new();
        registry.create(config("a")).await.unwrap();
        let err = registry.create(config("a")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let registry: MemoryRegistry<DeploymentConfig> = MemoryRegistry::new();
        assert!(registry.get("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_is_compare_and_set() {
        let registry = MemoryRegistry::new();
        let stored = registry.create(config("a")).await.unwrap();

        // Stale writer loses.
        let mut stale = stored.clone();
        stale.resource_version = stored.resource_version + 99;
        assert!(registry.update(stale).await.unwrap_err().is_conflict());

        // Current writer wins and bumps the version.
        let updated = registry.update(stored.clone()).await.unwrap();
        assert!(updated.resource_version > stored.resource_version);

        // The original writer is now stale.
        assert!(registry.update(stored).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn update_with_zero_version_skips_cas() {
        let registry = MemoryRegistry::new();
        registry.create(config("a")).await.unwrap();

        let mut blind = config("a");
        blind.latest_version = 7;
        let updated = registry.update(blind).await.unwrap();
        assert_eq!(updated.latest_version, 7);
    }

    #[tokio::test]
    async fn validator_rejects_on_write() {
        let registry = MemoryRegistry::with_validator(validate_deployment_config);
        let err = registry.create(config("")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn watch_sees_create_update_delete() {
        let registry = MemoryRegistry::new();
        let mut stream = registry.watch(0).await.unwrap();

        let created = registry.create(config("a")).await.unwrap();
        registry.update(created).await.unwrap();
        registry.delete("a").await.unwrap();

        let added = stream.next().await.unwrap();
        assert_eq!(added.kind, EventKind::Added);
        assert_eq!(added.object.id, "a");

        assert_eq!(stream.next().await.unwrap().kind, EventKind::Modified);
        assert_eq!(stream.next().await.unwrap().kind, EventKind::Deleted);
    }

    #[tokio::test]
    async fn close_ends_streams_and_refuses_new_watches() {
        let registry: MemoryRegistry<DeploymentConfig> = MemoryRegistry::new();
        let mut stream = registry.watch(0).await.unwrap();

        registry.close();
        assert!(stream.next().await.is_none());
        assert!(matches!(registry.watch(0).await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn list_filters_by_selector() {
        let registry = MemoryRegistry::new();
        let mut tagged = config("a");
        tagged.labels.insert("app".to_string(), "api".to_string());
        registry.create(tagged).await.unwrap();
        registry.create(config("b")).await.unwrap();

        let everything = LabelSelector::everything();
        let (all, rv) = registry.list(&everything).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(rv >= all.iter().map(|c| c.resource_version).max().unwrap());

        let selector = LabelSelector::everything().with("app", "api");
        let (matched, _) = registry.list(&selector).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a");
    }
}
