//! Resource types reconciled by the control plane.
//!
//! All resources carry an `id`, a store-assigned `resource_version`, and a
//! label map; the `Object` trait exposes those to the generic store and
//! cache machinery. Triggers and strategies are tagged variants with
//! per-variant payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pod::PodTemplate;

/// Label key on a `Deployment` naming the config it was cut from.
pub const DEPLOYMENT_CONFIG_ID_LABEL: &str = "deploymentConfigId";

/// Behavior every stored resource kind shares.
pub trait Object: Clone + Send + Sync + 'static {
    /// Kind name used in logs and errors.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn resource_version(&self) -> u64;
    fn set_resource_version(&mut self, rv: u64);
    fn labels(&self) -> &BTreeMap<String, String>;
}

// ── DeploymentConfig ───────────────────────────────────────────────

/// Desired-state template for a rolling series of deployments, plus the
/// trigger policies that decide when a new version is cut.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub id: String,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Policies that cause new versions of this config to be generated.
    #[serde(default)]
    pub triggers: Vec<DeploymentTrigger>,
    /// What a deployment cut from this config looks like.
    #[serde(default)]
    pub template: DeploymentTemplate,
    /// Monotonically non-decreasing version; 0 means never deployed.
    #[serde(default)]
    pub latest_version: u64,
}

impl Object for DeploymentConfig {
    const KIND: &'static str = "DeploymentConfig";

    fn id(&self) -> &str {
        &self.id
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, rv: u64) {
        self.resource_version = rv;
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

impl DeploymentConfig {
    /// True iff any trigger is a config-change trigger.
    pub fn has_config_change_trigger(&self) -> bool {
        self.triggers
            .iter()
            .any(|t| matches!(t, DeploymentTrigger::ConfigChange))
    }

    /// Image-change trigger parameters with `automatic` set.
    pub fn automatic_image_triggers(&self) -> impl Iterator<Item = &ImageChangeParams> {
        self.triggers.iter().filter_map(|t| match t {
            DeploymentTrigger::ImageChange(params) if params.automatic => Some(params),
            _ => None,
        })
    }

    /// Parameters of the image-change trigger referencing `repo_name`.
    pub fn image_trigger_for_repo(&self, repo_name: &str) -> Option<&ImageChangeParams> {
        self.triggers.iter().find_map(|t| match t {
            DeploymentTrigger::ImageChange(params) if params.repository_name == repo_name => {
                Some(params)
            }
            _ => None,
        })
    }
}

/// Policy for a single trigger that results in a new deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeploymentTrigger {
    /// Placeholder policy; new versions are cut by explicit generation only.
    Manual,
    /// Cut a new version when a watched image repository tag moves.
    ImageChange(ImageChangeParams),
    /// Cut a new version when the config's own pod template changes.
    ConfigChange,
}

/// Parameters for the image-change trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChangeParams {
    /// Whether a new tag value regenerates the config without operator action.
    #[serde(default)]
    pub automatic: bool,
    /// Restricts image substitution to these container names.
    #[serde(default)]
    pub container_names: Vec<String>,
    /// Canonical name of the image repository to watch.
    pub repository_name: String,
    /// Repository tag to watch for changes.
    pub tag: String,
}

/// Everything needed to realize a deployment from a config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTemplate {
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    #[serde(default)]
    pub controller_template: ControllerTemplate,
}

/// How a deployment is carried out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeploymentStrategy {
    /// Simple remove-and-replace; not actionable by the deployment controller.
    #[default]
    Basic,
    /// A user-supplied worker pod carries out the rollout.
    CustomPod(CustomPodParams),
}

/// Parameters for the custom-pod strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPodParams {
    /// Image of the deployer pod's single container.
    pub image: String,
    /// Environment given to the deployer container.
    #[serde(default)]
    pub environment: Vec<crate::pod::EnvVar>,
}

/// Replication state a deployment drives towards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerTemplate {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub replica_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub pod_template: PodTemplate,
}

// ── Deployment ─────────────────────────────────────────────────────

/// A single concrete rollout realized from a `DeploymentConfig`.
///
/// The `controller_template` is a deep, independent snapshot of the
/// config's template taken at creation time; it is never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub status: DeploymentStatus,
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    #[serde(default)]
    pub controller_template: ControllerTemplate,
}

impl Object for Deployment {
    const KIND: &'static str = "Deployment";

    fn id(&self) -> &str {
        &self.id
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, rv: u64) {
        self.resource_version = rv;
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

impl Deployment {
    /// The config this deployment was cut from, via its label.
    pub fn config_id(&self) -> Option<&str> {
        self.labels.get(DEPLOYMENT_CONFIG_ID_LABEL).map(|s| s.as_str())
    }
}

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Accepted but not yet acted upon.
    #[default]
    New,
    /// Deployer pod created, not yet running.
    Pending,
    /// Deployer pod is running.
    Running,
    /// Deployer pod finished without error. Terminal.
    Complete,
    /// Deployer pod failed or disappeared. Terminal.
    Failed,
}

impl DeploymentStatus {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Complete | DeploymentStatus::Failed)
    }
}

// ── ImageRepository ────────────────────────────────────────────────

/// A remote image location with a mutable tag → revision mapping.
///
/// Tag revisions are opaque strings; equality is the only operation the
/// control plane performs on them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepository {
    pub id: String,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Canonical repository name; the key the trigger index uses.
    pub docker_image_repository: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Object for ImageRepository {
    const KIND: &'static str = "ImageRepository";

    fn id(&self) -> &str {
        &self.id
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, rv: u64) {
        self.resource_version = rv;
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}
