//! Controller wiring.
//!
//! Each factory pairs reflectors with the typed sinks its controller
//! consumes, then spawns the reflector tasks and the single worker task.
//! The caller owns the shutdown channel and awaits the returned handles.

use std::sync::Arc;
use std::time::Duration;

use capstan_cache::{Fifo, KeyedStore, Reflector, Tee};
use capstan_core::{Deployment, DeploymentConfig, EnvVar, ImageRepository};
use capstan_generator::ConfigRegenerator;
use capstan_store::{PodClient, ResourceClient};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::caches::{ConfigCache, ImageRepoCache};
use crate::config_change::ConfigChangeController;
use crate::deployment::DeploymentController;
use crate::deployment_config::DeploymentConfigController;
use crate::image_change::ImageChangeController;

/// Wires the config-change controller: a config FIFO for work dispatch
/// plus a deployment store for latest-rollout lookups.
pub struct ConfigChangeControllerFactory {
    pub configs: Arc<dyn ResourceClient<DeploymentConfig>>,
    pub deployments: Arc<dyn ResourceClient<Deployment>>,
    pub generator: Arc<dyn ConfigRegenerator>,
    /// Periodic relist of configs; `None` stays purely event-driven.
    pub resync: Option<Duration>,
}

impl ConfigChangeControllerFactory {
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let queue = Arc::new(Fifo::new());
        let deployment_store = Arc::new(KeyedStore::new());

        let mut config_reflector = Reflector::new(Arc::clone(&self.configs), Arc::clone(&queue));
        if let Some(period) = self.resync {
            config_reflector = config_reflector.resync_every(period);
        }
        let deployment_reflector =
            Reflector::new(Arc::clone(&self.deployments), Arc::clone(&deployment_store));

        let controller = ConfigChangeController::new(
            queue,
            deployment_store,
            Arc::clone(&self.generator),
            Arc::clone(&self.configs),
        );

        vec![
            tokio::spawn(config_reflector.run(shutdown.clone())),
            tokio::spawn(deployment_reflector.run(shutdown.clone())),
            tokio::spawn(controller.run(shutdown)),
        ]
    }
}

/// Wires the image-change controller: a repository FIFO teed with the
/// repository cache, plus a config cache for the trigger walk.
pub struct ImageChangeControllerFactory {
    pub configs: Arc<dyn ResourceClient<DeploymentConfig>>,
    pub image_repos: Arc<dyn ResourceClient<ImageRepository>>,
    pub deployments: Arc<dyn ResourceClient<Deployment>>,
    pub generator: Arc<dyn ConfigRegenerator>,
    /// Periodic relist of repositories; `None` stays purely event-driven.
    pub resync: Option<Duration>,
}

impl ImageChangeControllerFactory {
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let queue = Arc::new(Fifo::new());
        let repo_cache = Arc::new(ImageRepoCache::new());
        let config_cache = Arc::new(ConfigCache::new());

        let mut repo_reflector = Reflector::new(
            Arc::clone(&self.image_repos),
            Tee(Arc::clone(&queue), Arc::clone(&repo_cache)),
        );
        if let Some(period) = self.resync {
            repo_reflector = repo_reflector.resync_every(period);
        }
        let config_reflector = Reflector::new(Arc::clone(&self.configs), Arc::clone(&config_cache));

        let controller = ImageChangeController::new(
            queue,
            config_cache,
            repo_cache,
            Arc::clone(&self.generator),
            Arc::clone(&self.configs),
            Arc::clone(&self.image_repos),
            Arc::clone(&self.deployments),
        );

        vec![
            tokio::spawn(repo_reflector.run(shutdown.clone())),
            tokio::spawn(config_reflector.run(shutdown.clone())),
            tokio::spawn(controller.run(shutdown)),
        ]
    }
}

/// Wires the deployment-config controller: a config FIFO, nothing else.
pub struct DeploymentConfigControllerFactory {
    pub configs: Arc<dyn ResourceClient<DeploymentConfig>>,
    pub deployments: Arc<dyn ResourceClient<Deployment>>,
    /// Periodic relist of configs; `None` stays purely event-driven.
    pub resync: Option<Duration>,
}

impl DeploymentConfigControllerFactory {
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let queue = Arc::new(Fifo::new());
        let mut config_reflector = Reflector::new(Arc::clone(&self.configs), Arc::clone(&queue));
        if let Some(period) = self.resync {
            config_reflector = config_reflector.resync_every(period);
        }
        let controller = DeploymentConfigController::new(queue, Arc::clone(&self.deployments));

        vec![
            tokio::spawn(config_reflector.run(shutdown.clone())),
            tokio::spawn(controller.run(shutdown)),
        ]
    }
}

/// Wires the deployment controller: a deployment FIFO plus the pod API.
pub struct DeploymentControllerFactory {
    pub deployments: Arc<dyn ResourceClient<Deployment>>,
    pub pods: Arc<dyn PodClient>,
    /// Environment appended to every deployer pod.
    pub environment: Vec<EnvVar>,
    /// Periodic relist of deployments. Pod status is polled, not watched,
    /// so in-flight rollouts only progress on redelivery.
    pub resync: Duration,
}

impl DeploymentControllerFactory {
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let queue = Arc::new(Fifo::new());
        let deployment_reflector = Reflector::new(Arc::clone(&self.deployments), Arc::clone(&queue))
            .resync_every(self.resync);
        let controller = DeploymentController::new(
            queue,
            Arc::clone(&self.deployments),
            Arc::clone(&self.pods),
            self.environment.clone(),
        );

        vec![
            tokio::spawn(deployment_reflector.run(shutdown.clone())),
            tokio::spawn(controller.run(shutdown)),
        ]
    }
}
