//! Trigger indexes.
//!
//! `ImageRepoTriggers` maps image repositories to the configs subscribed
//! to them (and back); `ConfigChangeTriggerSet` tracks which configs
//! carry a config-change trigger. Both are rebuilt from a config's
//! triggers on every config event and are exclusively owned by their
//! controller's worker.

use std::collections::{BTreeSet, HashMap};

use capstan_core::{referenced_images, Deployment, DeploymentConfig, ImageRepository};

/// Bidirectional mapping between repository names and subscribed config
/// ids. Empty inner sets are removed, never retained.
#[derive(Debug, Default)]
pub struct ImageRepoTriggers {
    repos_to_configs: HashMap<String, BTreeSet<String>>,
    configs_to_repos: HashMap<String, BTreeSet<String>>,
}

impl ImageRepoTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add membership on both sides. Idempotent.
    pub fn insert(&mut self, config_id: &str, repo_names: &BTreeSet<String>) {
        for repo in repo_names {
            self.repos_to_configs
                .entry(repo.clone())
                .or_default()
                .insert(config_id.to_string());
            self.configs_to_repos
                .entry(config_id.to_string())
                .or_default()
                .insert(repo.clone());
        }
    }

    /// Delete membership on both sides, dropping emptied inner sets.
    pub fn remove(&mut self, config_id: &str, repo_names: &BTreeSet<String>) {
        for repo in repo_names {
            if let Some(configs) = self.repos_to_configs.get_mut(repo) {
                configs.remove(config_id);
                if configs.is_empty() {
                    self.repos_to_configs.remove(repo);
                }
            }
            if let Some(repos) = self.configs_to_repos.get_mut(config_id) {
                repos.remove(repo);
                if repos.is_empty() {
                    self.configs_to_repos.remove(config_id);
                }
            }
        }
    }

    pub fn configs_for_repo(&self, repo_name: &str) -> BTreeSet<String> {
        self.repos_to_configs.get(repo_name).cloned().unwrap_or_default()
    }

    pub fn repos_for_config(&self, config_id: &str) -> BTreeSet<String> {
        self.configs_to_repos.get(config_id).cloned().unwrap_or_default()
    }

    /// True iff any config subscribes to `repo`.
    pub fn has_registered_triggers(&self, repo: &ImageRepository) -> bool {
        self.repos_to_configs
            .get(&repo.docker_image_repository)
            .is_some_and(|configs| !configs.is_empty())
    }

    /// Whether `repo`'s current tag value diverges from the image revision
    /// the latest deployment references for it.
    ///
    /// A trigger whose tag is absent from the repository never fires: the
    /// generator would skip the substitution anyway, and firing would loop
    /// on a regeneration that changes nothing.
    pub fn fire(
        &self,
        repo: &ImageRepository,
        config: &DeploymentConfig,
        latest: &Deployment,
    ) -> bool {
        let Some(params) = config.image_trigger_for_repo(&repo.docker_image_repository) else {
            return false;
        };
        let Some(latest_revision) = repo.tags.get(&params.tag) else {
            return false;
        };
        referenced_images(latest).get(&repo.docker_image_repository) != Some(latest_revision)
    }

    /// Rebuild the index entries for one config from its current triggers:
    /// insert what it references now, remove what it no longer does.
    pub fn refresh(&mut self, config: &DeploymentConfig) {
        let current: BTreeSet<String> = config
            .automatic_image_triggers()
            .map(|params| params.repository_name.clone())
            .collect();

        let previous = self.repos_for_config(&config.id);
        self.insert(&config.id, &current);
        let removed: BTreeSet<String> = previous.difference(&current).cloned().collect();
        self.remove(&config.id, &removed);
    }

    /// Refresh every config in `configs` and evict configs no longer
    /// present (a deleted config takes all its triggers with it).
    pub fn refresh_all(&mut self, configs: &[DeploymentConfig]) {
        let live: BTreeSet<&str> = configs.iter().map(|c| c.id.as_str()).collect();
        let stale: Vec<String> = self
            .configs_to_repos
            .keys()
            .filter(|id| !live.contains(id.as_str()))
            .cloned()
            .collect();
        for config_id in stale {
            let repos = self.repos_for_config(&config_id);
            self.remove(&config_id, &repos);
        }
        for config in configs {
            self.refresh(config);
        }
    }
}

/// Membership set of configs currently carrying a config-change trigger.
#[derive(Debug, Default)]
pub struct ConfigChangeTriggerSet {
    configs: BTreeSet<String>,
}

impl ConfigChangeTriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update membership from the config's current triggers.
    pub fn refresh(&mut self, config: &DeploymentConfig) {
        if config.has_config_change_trigger() {
            self.configs.insert(config.id.clone());
        } else {
            self.configs.remove(&config.id);
        }
    }

    pub fn remove(&mut self, config_id: &str) {
        self.configs.remove(config_id);
    }

    pub fn contains(&self, config_id: &str) -> bool {
        self.configs.contains(config_id)
    }
}
