//! Deployment-config controller.
//!
//! Watches `DeploymentConfig` events and cuts a new `Deployment` whenever
//! a config's latest version has no realized rollout. The deployment gets
//! an independent snapshot of the config's template; a lost create race
//! means another replica already cut it and is ignored.

use std::sync::Arc;

use capstan_cache::Fifo;
use capstan_core::{
    latest_deployment_id, pod_templates_equal, Deployment, DeploymentConfig,
    DEPLOYMENT_CONFIG_ID_LABEL,
};
use capstan_store::ResourceClient;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct DeploymentConfigController {
    queue: Arc<Fifo<DeploymentConfig>>,
    deployments: Arc<dyn ResourceClient<Deployment>>,
}

impl DeploymentConfigController {
    pub fn new(
        queue: Arc<Fifo<DeploymentConfig>>,
        deployments: Arc<dyn ResourceClient<Deployment>>,
    ) -> Self {
        Self { queue, deployments }
    }

    /// Consume config events until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("deployment-config controller started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                popped = self.queue.pop() => match popped {
                    Some(config) => self.process(config).await,
                    None => break,
                },
            }
        }
        info!("deployment-config controller stopped");
    }

    async fn process(&self, config: DeploymentConfig) {
        if config.latest_version == 0 {
            debug!(config = %config.id, "latest version is zero, nothing to deploy");
            return;
        }

        let deployment_id = latest_deployment_id(&config);
        match self.deployments.get(&deployment_id).await {
            Ok(latest) => {
                if templates_match(&latest, &config) {
                    debug!(
                        config = %config.id,
                        deployment = %deployment_id,
                        "latest deployment matches, nothing to do"
                    );
                    return;
                }
                // The generator should have bumped the version before the
                // templates could diverge; recutting here is defense in
                // depth against a stale deployment.
                self.deploy(&config, deployment_id).await;
            }
            Err(e) if e.is_not_found() => {
                self.deploy(&config, deployment_id).await;
            }
            Err(e) => {
                warn!(config = %config.id, error = %e, "latest deployment lookup failed");
            }
        }
    }

    async fn deploy(&self, config: &DeploymentConfig, deployment_id: String) {
        let mut labels = config.labels.clone();
        labels.insert(DEPLOYMENT_CONFIG_ID_LABEL.to_string(), config.id.clone());

        let deployment = Deployment {
            id: deployment_id,
            labels,
            strategy: config.template.strategy.clone(),
            controller_template: config.template.controller_template.clone(),
            ..Deployment::default()
        };

        info!(config = %config.id, deployment = %deployment.id, "creating deployment");
        match self.deployments.create(deployment).await {
            Ok(_) => {}
            Err(e) if e.is_already_exists() => {
                // Another replica produced it.
                debug!(config = %config.id, "deployment already exists");
            }
            Err(e) => {
                warn!(config = %config.id, error = %e, "deployment create failed");
            }
        }
    }
}

fn templates_match(latest: &Deployment, config: &DeploymentConfig) -> bool {
    pod_templates_equal(
        &latest.controller_template.pod_template,
        &config.template.controller_template.pod_template,
    )
}
