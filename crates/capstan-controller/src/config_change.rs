//! Config-change controller.
//!
//! Watches `DeploymentConfig` events so that a human edit to a config's
//! pod template automatically produces a new version — but only when the
//! change is genuine. Comparing against the latest deployment's template
//! is what prevents an infinite loop when another controller writes the
//! config back.

use std::sync::Arc;

use capstan_cache::{Fifo, KeyedStore};
use capstan_core::{latest_deployment_id, pod_templates_equal, Deployment, DeploymentConfig};
use capstan_generator::ConfigRegenerator;
use capstan_store::ResourceClient;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::regen::regenerate_config;
use crate::triggers::ConfigChangeTriggerSet;

pub struct ConfigChangeController {
    queue: Arc<Fifo<DeploymentConfig>>,
    deployments: Arc<KeyedStore<Deployment>>,
    trigger_set: ConfigChangeTriggerSet,
    generator: Arc<dyn ConfigRegenerator>,
    configs: Arc<dyn ResourceClient<DeploymentConfig>>,
}

impl ConfigChangeController {
    pub fn new(
        queue: Arc<Fifo<DeploymentConfig>>,
        deployments: Arc<KeyedStore<Deployment>>,
        generator: Arc<dyn ConfigRegenerator>,
        configs: Arc<dyn ResourceClient<DeploymentConfig>>,
    ) -> Self {
        Self {
            queue,
            deployments,
            trigger_set: ConfigChangeTriggerSet::new(),
            generator,
            configs,
        }
    }

    /// Consume config events until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("config-change controller started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                popped = self.queue.pop() => match popped {
                    Some(config) => self.process(config).await,
                    None => break,
                },
            }
        }
        info!("config-change controller stopped");
    }

    async fn process(&mut self, config: DeploymentConfig) {
        self.trigger_set.refresh(&config);

        if !self.trigger_set.contains(&config.id) {
            debug!(config = %config.id, "no config-change trigger, skipping");
            return;
        }

        if config.latest_version == 0 {
            debug!(config = %config.id, "latest version is zero, skipping");
            return;
        }

        let deployment_id = latest_deployment_id(&config);
        let Some(latest) = self.deployments.get(&deployment_id) else {
            debug!(config = %config.id, deployment = %deployment_id, "no latest deployment yet, skipping");
            return;
        };

        if pod_templates_equal(
            &config.template.controller_template.pod_template,
            &latest.controller_template.pod_template,
        ) {
            debug!(
                config = %config.id,
                version = config.latest_version,
                "pod template matches latest deployment, skipping"
            );
            return;
        }

        if let Err(e) = regenerate_config(&self.generator, &self.configs, &config.id).await {
            // The config stays put; a later event retries.
            warn!(config = %config.id, error = %e, "regeneration failed");
        }
    }
}
