//! The pod surface consumed by the control plane.
//!
//! Deployer pods are short-lived workers launched by the deployment
//! controller to carry out a single rollout. The controller only ever
//! creates them, polls their status, and deletes them on success; the pod
//! runtime itself is an external collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single environment variable given to a container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A container within a pod manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    /// Image reference in `name:revision` form.
    pub image: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// The ordered set of containers a pod runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// Restart behavior for a pod's containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartPolicy {
    #[default]
    Always,
    /// Run to completion once; deployer pods always use this.
    Never,
}

/// Desired state of a pod: what to run and how to restart it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodState {
    #[serde(default)]
    pub manifest: ContainerManifest,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

/// The pod template a deployment stamps out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    #[serde(default)]
    pub desired_state: PodState,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Top-level observed pod status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PodPhase {
    #[default]
    Waiting,
    Running,
    Terminated,
}

/// Terminal information for a finished container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    pub exit_code: i32,
}

/// Observed status of a single container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    /// Present once the container has finished.
    #[serde(default)]
    pub termination: Option<Termination>,
}

/// Observed state of a pod as reported by the pod runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCurrentState {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

/// A worker pod.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub id: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub desired_state: PodState,
    #[serde(default)]
    pub current_state: PodCurrentState,
}

impl Pod {
    /// True once the pod has terminated with every container exiting zero.
    pub fn succeeded(&self) -> bool {
        self.current_state.phase == PodPhase::Terminated
            && self
                .current_state
                .container_statuses
                .iter()
                .all(|c| matches!(c.termination, Some(t) if t.exit_code == 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminated_pod(exit_codes: &[i32]) -> Pod {
        Pod {
            id: "deploy-c1-1".to_string(),
            current_state: PodCurrentState {
                phase: PodPhase::Terminated,
                container_statuses: exit_codes
                    .iter()
                    .enumerate()
                    .map(|(i, code)| ContainerStatus {
                        name: format!("c{i}"),
                        termination: Some(Termination { exit_code: *code }),
                    })
                    .collect(),
            },
            ..Pod::default()
        }
    }

    #[test]
    fn succeeded_requires_all_zero_exits() {
        assert!(terminated_pod(&[0]).succeeded());
        assert!(terminated_pod(&[0, 0]).succeeded());
        assert!(!terminated_pod(&[0, 2]).succeeded());
    }

    #[test]
    fn running_pod_has_not_succeeded() {
        let mut pod = terminated_pod(&[0]);
        pod.current_state.phase = PodPhase::Running;
        assert!(!pod.succeeded());
    }

    #[test]
    fn container_without_termination_has_not_succeeded() {
        let mut pod = terminated_pod(&[0]);
        pod.current_state.container_statuses[0].termination = None;
        assert!(!pod.succeeded());
    }
}
