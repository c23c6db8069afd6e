//! Snapshot caches fed by reflectors.
//!
//! Both caches are shared between a reflector task (writer) and a
//! controller worker (reader), so their maps sit behind a mutex. Critical
//! sections hold only map mutations and lookups; no RPC happens under a
//! lock.

use std::collections::HashMap;
use std::sync::Mutex;

use capstan_core::{DeploymentConfig, ImageRepository, Object};
use capstan_store::{EventKind, WatchEvent};

use capstan_cache::EventSink;

/// Most-recent `ImageRepository` snapshot per canonical repository name.
#[derive(Default)]
pub struct ImageRepoCache {
    store: Mutex<HashMap<String, ImageRepository>>,
}

impl ImageRepoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ImageRepository>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn refresh(&self, repo: &ImageRepository) {
        self.lock()
            .insert(repo.docker_image_repository.clone(), repo.clone());
    }

    pub fn delete(&self, repo: &ImageRepository) {
        self.lock().remove(&repo.docker_image_repository);
    }

    /// Swap the whole cache for a fresh listing.
    pub fn replace_all(&self, repos: &[ImageRepository]) {
        let mut store = self.lock();
        store.clear();
        for repo in repos {
            store.insert(repo.docker_image_repository.clone(), repo.clone());
        }
    }

    /// Snapshot for `name`, if the repository has been observed.
    pub fn cached(&self, name: &str) -> Option<ImageRepository> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventSink<ImageRepository> for ImageRepoCache {
    fn replace(&self, items: &[ImageRepository]) {
        self.replace_all(items);
    }

    fn apply(&self, event: &WatchEvent<ImageRepository>) {
        match event.kind {
            EventKind::Added | EventKind::Modified => self.refresh(&event.object),
            EventKind::Deleted => self.delete(&event.object),
        }
    }
}

/// Most-recent `DeploymentConfig` snapshot per config id.
#[derive(Default)]
pub struct ConfigCache {
    store: Mutex<HashMap<String, DeploymentConfig>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DeploymentConfig>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the snapshot. Returns true when the config is new or its
    /// `latest_version` differs from the previously cached one.
    pub fn refresh(&self, config: &DeploymentConfig) -> bool {
        let mut store = self.lock();
        let version_changed = match store.get(&config.id) {
            Some(current) => current.latest_version != config.latest_version,
            None => true,
        };
        store.insert(config.id.clone(), config.clone());
        version_changed
    }

    pub fn delete(&self, config_id: &str) {
        self.lock().remove(config_id);
    }

    pub fn cached(&self, config_id: &str) -> Option<DeploymentConfig> {
        self.lock().get(config_id).cloned()
    }

    /// All cached configs, ordered by id.
    pub fn all(&self) -> Vec<DeploymentConfig> {
        let mut configs: Vec<DeploymentConfig> = self.lock().values().cloned().collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventSink<DeploymentConfig> for ConfigCache {
    fn replace(&self, items: &[DeploymentConfig]) {
        let mut store = self.lock();
        store.clear();
        for config in items {
            store.insert(config.id.clone(), config.clone());
        }
    }

    fn apply(&self, event: &WatchEvent<DeploymentConfig>) {
        match event.kind {
            EventKind::Added | EventKind::Modified => {
                self.refresh(&event.object);
            }
            EventKind::Deleted => self.delete(event.object.id()),
        }
    }
}
