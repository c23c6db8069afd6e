//! Core resource model for the Capstan control plane.
//!
//! Capstan reconciles three resource kinds: a `DeploymentConfig` describes
//! the desired state of a rolling series of deployments plus the trigger
//! policies that cut new versions; a `Deployment` is one concrete rollout
//! realized from a config at a specific version; an `ImageRepository` is a
//! watched mapping from image tags to revisions.
//!
//! # Components
//!
//! - **`types`** — resource types, triggers, strategies, templates
//! - **`pod`** — the pod surface consumed by the deployment controller
//! - **`selector`** — label-set selectors for list operations
//! - **`util`** — id derivation, image-reference parsing, template equality
//! - **`validation`** — write-time validation rules

pub mod pod;
pub mod selector;
pub mod types;
pub mod util;
pub mod validation;

pub use pod::{
    Container, ContainerManifest, ContainerStatus, EnvVar, Pod, PodCurrentState, PodPhase,
    PodState, PodTemplate, RestartPolicy, Termination,
};
pub use selector::LabelSelector;
pub use types::{
    ControllerTemplate, CustomPodParams, Deployment, DeploymentConfig, DeploymentStatus,
    DeploymentStrategy, DeploymentTemplate, DeploymentTrigger, ImageChangeParams, ImageRepository,
    Object, DEPLOYMENT_CONFIG_ID_LABEL,
};
pub use util::{
    latest_deployment_id, parse_image, pod_templates_equal, referenced_images, referenced_repos,
};
pub use validation::{validate_deployment, validate_deployment_config, ValidationError};
