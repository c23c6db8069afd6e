//! Standalone mode — the whole control plane in one process.
//!
//! Assembles the in-memory registries, the pod API stand-in, the config
//! generator, and the four controllers, then waits for ctrl-c. Shutdown
//! fans out over a watch channel: registries drop their watch
//! subscriptions, reflectors stop, FIFO pops return the terminal marker,
//! and every task is awaited before exit.

use std::sync::Arc;
use std::time::Duration;

use capstan_controller::{
    ConfigChangeControllerFactory, DeploymentConfigControllerFactory, DeploymentControllerFactory,
    ImageChangeControllerFactory,
};
use capstan_core::validation::{validate_deployment, validate_deployment_config};
use capstan_core::{Deployment, DeploymentConfig, EnvVar, ImageRepository};
use capstan_generator::{ConfigRegenerator, DeploymentConfigGenerator};
use capstan_store::{MemoryPods, MemoryRegistry};
use tokio::sync::watch;
use tracing::info;

pub async fn run(environment: Vec<EnvVar>, resync: Duration) -> anyhow::Result<()> {
    info!("capstand starting in standalone mode");

    // ── Object store and pod API ───────────────────────────────────
    let configs = MemoryRegistry::<DeploymentConfig>::with_validator(validate_deployment_config);
    let deployments = MemoryRegistry::<Deployment>::with_validator(validate_deployment);
    let image_repos = MemoryRegistry::<ImageRepository>::new();
    let pods = MemoryPods::new();
    info!("in-memory object store ready");

    // ── Generator ──────────────────────────────────────────────────
    let generator: Arc<dyn ConfigRegenerator> = Arc::new(DeploymentConfigGenerator::new(
        Arc::new(configs.clone()),
        Arc::new(deployments.clone()),
        Arc::new(image_repos.clone()),
    ));

    // ── Controllers ────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    handles.extend(
        ImageChangeControllerFactory {
            configs: Arc::new(configs.clone()),
            image_repos: Arc::new(image_repos.clone()),
            deployments: Arc::new(deployments.clone()),
            generator: Arc::clone(&generator),
            resync: Some(resync),
        }
        .start(shutdown_rx.clone()),
    );
    handles.extend(
        ConfigChangeControllerFactory {
            configs: Arc::new(configs.clone()),
            deployments: Arc::new(deployments.clone()),
            generator: Arc::clone(&generator),
            resync: Some(resync),
        }
        .start(shutdown_rx.clone()),
    );
    handles.extend(
        DeploymentConfigControllerFactory {
            configs: Arc::new(configs.clone()),
            deployments: Arc::new(deployments.clone()),
            resync: Some(resync),
        }
        .start(shutdown_rx.clone()),
    );
    handles.extend(
        DeploymentControllerFactory {
            deployments: Arc::new(deployments.clone()),
            pods: Arc::new(pods),
            environment,
            resync,
        }
        .start(shutdown_rx),
    );
    info!(tasks = handles.len(), "controllers running");

    // ── Wait for shutdown ──────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    configs.close();
    deployments.close();
    image_repos.close();

    for handle in handles {
        let _ = handle.await;
    }

    info!("capstand stopped");
    Ok(())
}
