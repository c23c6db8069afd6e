//! The control loops.
//!
//! Four cooperating controllers reconcile the system, each with one
//! background reflector per watched kind and exactly one worker task:
//!
//! - **image-change** — watches `ImageRepository` events and regenerates
//!   subscribed configs whose referenced tag moved
//! - **config-change** — watches `DeploymentConfig` events and regenerates
//!   configs carrying a config-change trigger whose pod template diverged
//!   from the latest deployment
//! - **deployment-config** — cuts a new `Deployment` when a config's
//!   latest version has no realized rollout yet
//! - **deployment** — drives each `Deployment` through its state machine
//!   by launching a deployer pod and observing its status
//!
//! Controllers exclusively own their caches and indexes and receive
//! narrow capability handles for everything else. Per-item errors are
//! logged and the loop moves on; the store's compare-and-set is the only
//! serialization between controllers racing on the same object.

pub mod caches;
pub mod config_change;
pub mod deployment;
pub mod deployment_config;
pub mod factory;
pub mod image_change;
mod regen;
pub mod triggers;

pub use caches::{ConfigCache, ImageRepoCache};
pub use config_change::ConfigChangeController;
pub use deployment::DeploymentController;
pub use deployment_config::DeploymentConfigController;
pub use factory::{
    ConfigChangeControllerFactory, DeploymentConfigControllerFactory, DeploymentControllerFactory,
    ImageChangeControllerFactory,
};
pub use image_change::ImageChangeController;
pub use triggers::{ConfigChangeTriggerSet, ImageRepoTriggers};
