//! Image-change controller.
//!
//! Watches `ImageRepository` events; when a watched tag diverges from the
//! image revision a subscribed config's latest deployment references, the
//! config is regenerated. On startup it reconciles missed events:
//! repositories may have moved while the controller was down, so it lists
//! current state and fires triggers against each config's latest
//! deployment before consuming the watch stream.

use std::collections::BTreeSet;
use std::sync::Arc;

use capstan_cache::Fifo;
use capstan_core::{
    latest_deployment_id, referenced_repos, Deployment, DeploymentConfig, ImageRepository,
    LabelSelector,
};
use capstan_generator::ConfigRegenerator;
use capstan_store::ResourceClient;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::caches::{ConfigCache, ImageRepoCache};
use crate::regen::regenerate_config;
use crate::triggers::ImageRepoTriggers;

pub struct ImageChangeController {
    queue: Arc<Fifo<ImageRepository>>,
    config_cache: Arc<ConfigCache>,
    repo_cache: Arc<ImageRepoCache>,
    triggers: ImageRepoTriggers,
    generator: Arc<dyn ConfigRegenerator>,
    configs: Arc<dyn ResourceClient<DeploymentConfig>>,
    image_repos: Arc<dyn ResourceClient<ImageRepository>>,
    deployments: Arc<dyn ResourceClient<Deployment>>,
}

impl ImageChangeController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<Fifo<ImageRepository>>,
        config_cache: Arc<ConfigCache>,
        repo_cache: Arc<ImageRepoCache>,
        generator: Arc<dyn ConfigRegenerator>,
        configs: Arc<dyn ResourceClient<DeploymentConfig>>,
        image_repos: Arc<dyn ResourceClient<ImageRepository>>,
        deployments: Arc<dyn ResourceClient<Deployment>>,
    ) -> Self {
        Self {
            queue,
            config_cache,
            repo_cache,
            triggers: ImageRepoTriggers::new(),
            generator,
            configs,
            image_repos,
            deployments,
        }
    }

    /// Reconcile missed events, then consume repository events until
    /// shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("image-change controller started");

        if let Err(e) = self.bootstrap().await {
            // Without the initial listing there is nothing sound to serve;
            // leave restart to the supervising runtime.
            error!(error = %e, "image-change bootstrap failed");
            return;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                popped = self.queue.pop() => match popped {
                    Some(repo) => self.process_repo(repo).await,
                    None => break,
                },
            }
        }
        info!("image-change controller stopped");
    }

    /// Heal triggers that fired while the controller was down: list the
    /// full current state and fire each config's triggers against its
    /// latest deployment. Regeneration is idempotent, so reprocessing
    /// state that already converged writes nothing new.
    async fn bootstrap(&mut self) -> Result<(), capstan_store::StoreError> {
        let everything = LabelSelector::everything();
        let (repos, _) = self.image_repos.list(&everything).await?;
        self.repo_cache.replace_all(&repos);

        let (configs, _) = self.configs.list(&everything).await?;
        self.triggers.refresh_all(&configs);

        info!(repos = repos.len(), configs = configs.len(), "detecting missed triggers");
        for config in &configs {
            self.config_cache.refresh(config);

            if config.latest_version == 0 {
                continue;
            }

            let latest = match self.deployments.get(&latest_deployment_id(config)).await {
                Ok(latest) => latest,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(config = %config.id, error = %e, "latest deployment lookup failed");
                    continue;
                }
            };

            let missed = referenced_repos(config).iter().any(|name| {
                self.repo_cache
                    .cached(name)
                    .is_some_and(|repo| self.triggers.fire(&repo, config, &latest))
            });

            if missed {
                debug!(config = %config.id, "missed image trigger detected");
                if let Err(e) = regenerate_config(&self.generator, &self.configs, &config.id).await
                {
                    warn!(config = %config.id, error = %e, "regeneration failed");
                }
            }
        }

        Ok(())
    }

    async fn process_repo(&mut self, repo: ImageRepository) {
        // Rebuild the index from the current config view; a config event
        // between pops is picked up here, and deleted configs drop out.
        let configs = self.config_cache.all();
        self.triggers.refresh_all(&configs);

        if !self.triggers.has_registered_triggers(&repo) {
            debug!(repo = %repo.docker_image_repository, "no registered triggers, skipping");
            return;
        }

        // The fired/not-fired decision is made against the latest realized
        // deployment's images, not the config's own template: a config
        // whose regeneration hasn't been rolled out yet would otherwise
        // look permanently divergent.
        let mut marked = BTreeSet::new();
        for config_id in self.triggers.configs_for_repo(&repo.docker_image_repository) {
            let Some(config) = self.config_cache.cached(&config_id) else {
                continue;
            };

            let latest = match self.deployments.get(&latest_deployment_id(&config)).await {
                Ok(latest) => latest,
                Err(e) if e.is_not_found() => {
                    debug!(
                        config = %config.id,
                        repo = %repo.docker_image_repository,
                        "latest deployment not realized yet, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(config = %config.id, error = %e, "latest deployment lookup failed");
                    continue;
                }
            };

            if self.triggers.fire(&repo, &config, &latest) {
                marked.insert(config_id);
            }
        }

        for config_id in marked {
            debug!(config = %config_id, repo = %repo.docker_image_repository, "tag moved, regenerating");
            if let Err(e) = regenerate_config(&self.generator, &self.configs, &config_id).await {
                warn!(config = %config_id, error = %e, "regeneration failed");
            }
        }
    }
}
