//! Deployment controller.
//!
//! Drives each `Deployment` through its state machine by launching a
//! deployer pod and observing its status:
//!
//! ```text
//! New ──create pod──▶ Pending ──pod running──▶ Running ──┬──▶ Complete
//!  │                     │                        │      └──▶ Failed
//!  └──create failed──▶ Failed ◀──pod gone/non-zero exit──┘
//! ```
//!
//! `Complete` and `Failed` are terminal and never rewritten. Only a
//! successful rollout deletes its deployer pod; failed pods are kept for
//! inspection.

use std::sync::Arc;

use capstan_cache::Fifo;
use capstan_core::pod::{Container, ContainerManifest, Pod, PodPhase, PodState, RestartPolicy};
use capstan_core::types::{CustomPodParams, DeploymentStrategy};
use capstan_core::{Deployment, DeploymentStatus, EnvVar};
use capstan_store::{PodClient, ResourceClient};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Environment variable naming the rollout a deployer pod works on.
pub const DEPLOYMENT_ID_ENV: &str = "KUBERNETES_DEPLOYMENT_ID";

pub struct DeploymentController {
    queue: Arc<Fifo<Deployment>>,
    deployments: Arc<dyn ResourceClient<Deployment>>,
    pods: Arc<dyn PodClient>,
    /// Appended to every deployer pod's environment.
    environment: Vec<EnvVar>,
}

impl DeploymentController {
    pub fn new(
        queue: Arc<Fifo<Deployment>>,
        deployments: Arc<dyn ResourceClient<Deployment>>,
        pods: Arc<dyn PodClient>,
        environment: Vec<EnvVar>,
    ) -> Self {
        Self {
            queue,
            deployments,
            pods,
            environment,
        }
    }

    /// Consume deployment events until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("deployment controller started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                popped = self.queue.pop() => match popped {
                    Some(deployment) => self.process(deployment).await,
                    None => break,
                },
            }
        }
        info!("deployment controller stopped");
    }

    async fn process(&self, deployment: Deployment) {
        if deployment.status.is_terminal() {
            debug!(deployment = %deployment.id, status = ?deployment.status, "terminal, skipping");
            return;
        }

        let next = match deployment.status {
            DeploymentStatus::New => self.handle_new(&deployment).await,
            DeploymentStatus::Pending => self.handle_pending(&deployment).await,
            DeploymentStatus::Running => self.handle_running(&deployment).await,
            DeploymentStatus::Complete | DeploymentStatus::Failed => return,
        };

        if next != deployment.status {
            self.save(deployment, next).await;
        }
    }

    /// Launch the deployer pod.
    async fn handle_new(&self, deployment: &Deployment) -> DeploymentStatus {
        let pod = match self.deployer_pod(deployment) {
            Some(pod) => pod,
            None => return DeploymentStatus::Failed,
        };

        match self.pods.create_pod(pod).await {
            Ok(pod) => {
                info!(deployment = %deployment.id, pod = %pod.id, "deployer pod created");
                DeploymentStatus::Pending
            }
            Err(e) if e.is_already_exists() => {
                // A lost state write got this deployment reprocessed; the
                // pod from the first pass is already underway.
                debug!(deployment = %deployment.id, "deployer pod already exists");
                DeploymentStatus::Pending
            }
            Err(e) => {
                warn!(deployment = %deployment.id, error = %e, "deployer pod create failed");
                DeploymentStatus::Failed
            }
        }
    }

    async fn handle_pending(&self, deployment: &Deployment) -> DeploymentStatus {
        match self.pods.get_pod(&deployer_pod_id(deployment)).await {
            Ok(pod) => match pod.current_state.phase {
                PodPhase::Running => DeploymentStatus::Running,
                PodPhase::Terminated => self.observe_terminated(deployment, &pod).await,
                PodPhase::Waiting => DeploymentStatus::Pending,
            },
            Err(e) if e.is_not_found() => {
                warn!(deployment = %deployment.id, "deployer pod disappeared");
                DeploymentStatus::Failed
            }
            Err(e) => {
                warn!(deployment = %deployment.id, error = %e, "deployer pod lookup failed");
                DeploymentStatus::Pending
            }
        }
    }

    async fn handle_running(&self, deployment: &Deployment) -> DeploymentStatus {
        match self.pods.get_pod(&deployer_pod_id(deployment)).await {
            Ok(pod) => match pod.current_state.phase {
                PodPhase::Terminated => self.observe_terminated(deployment, &pod).await,
                _ => DeploymentStatus::Running,
            },
            Err(e) if e.is_not_found() => {
                warn!(deployment = %deployment.id, "deployer pod disappeared");
                DeploymentStatus::Failed
            }
            Err(e) => {
                warn!(deployment = %deployment.id, error = %e, "deployer pod lookup failed");
                DeploymentStatus::Running
            }
        }
    }

    /// A terminated pod ends the rollout: all-zero exits complete it and
    /// clean up the pod; anything else fails it and keeps the pod around.
    async fn observe_terminated(&self, deployment: &Deployment, pod: &Pod) -> DeploymentStatus {
        if pod.succeeded() {
            if let Err(e) = self.pods.delete_pod(&pod.id).await {
                warn!(deployment = %deployment.id, pod = %pod.id, error = %e, "deployer pod cleanup failed");
            }
            info!(deployment = %deployment.id, "rollout complete");
            DeploymentStatus::Complete
        } else {
            info!(deployment = %deployment.id, "rollout failed");
            DeploymentStatus::Failed
        }
    }

    /// Write the transition back. A conflict means our copy went stale
    /// mid-flight; re-fetch and requeue rather than lose a pod-status
    /// driven transition (no watch event is coming to retry it for us).
    async fn save(&self, mut deployment: Deployment, next: DeploymentStatus) {
        let from = deployment.status;
        deployment.status = next;
        info!(deployment = %deployment.id, ?from, to = ?next, "saving state transition");

        match self.deployments.update(deployment.clone()).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                debug!(deployment = %deployment.id, "state write conflicted, requeueing");
                match self.deployments.get(&deployment.id).await {
                    Ok(fresh) => self.queue.push(fresh),
                    Err(e) => {
                        warn!(deployment = %deployment.id, error = %e, "re-fetch after conflict failed")
                    }
                }
            }
            Err(e) => {
                warn!(deployment = %deployment.id, error = %e, "state write failed");
            }
        }
    }

    /// Pod that carries out the rollout: the strategy's single container,
    /// its environment extended with the deployment id and the
    /// controller-wide environment, never restarted.
    fn deployer_pod(&self, deployment: &Deployment) -> Option<Pod> {
        let DeploymentStrategy::CustomPod(CustomPodParams { image, environment }) =
            &deployment.strategy
        else {
            // Upstream validation and generation only hand custom-pod
            // strategies to this controller.
            error!(deployment = %deployment.id, "unsupported strategy for deployer pod");
            return None;
        };

        let mut env = environment.clone();
        env.push(EnvVar::new(DEPLOYMENT_ID_ENV, deployment.id.clone()));
        env.extend(self.environment.iter().cloned());

        Some(Pod {
            id: deployer_pod_id(deployment),
            desired_state: PodState {
                manifest: ContainerManifest {
                    version: "v1".to_string(),
                    containers: vec![Container {
                        name: "deployment".to_string(),
                        image: image.clone(),
                        env,
                    }],
                },
                restart_policy: RestartPolicy::Never,
            },
            ..Pod::default()
        })
    }
}

/// The deployer pod id for a deployment: `deploy-<deploymentId>`.
pub fn deployer_pod_id(deployment: &Deployment) -> String {
    format!("deploy-{}", deployment.id)
}
