//! The consumed pod API.
//!
//! The worker-pod runtime is an external collaborator; the control plane
//! only creates deployer pods, polls their status, and deletes them after
//! a successful rollout. `MemoryPods` stands in for that runtime in the
//! standalone daemon and in tests, which drive status transitions by hand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capstan_core::pod::{ContainerStatus, Pod, PodPhase, Termination};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Create/get/delete surface of the pod runtime.
#[async_trait]
pub trait PodClient: Send + Sync {
    async fn create_pod(&self, pod: Pod) -> StoreResult<Pod>;
    async fn get_pod(&self, id: &str) -> StoreResult<Pod>;
    async fn delete_pod(&self, id: &str) -> StoreResult<()>;
}

/// In-memory pod runtime stand-in.
#[derive(Clone, Default)]
pub struct MemoryPods {
    pods: Arc<Mutex<HashMap<String, Pod>>>,
}

impl MemoryPods {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Pod>> {
        self.pods.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drive a pod's top-level phase (test/demo control surface).
    pub fn set_phase(&self, id: &str, phase: PodPhase) -> StoreResult<()> {
        let mut pods = self.lock();
        let pod = pods.get_mut(id).ok_or(StoreError::NotFound {
            kind: "Pod",
            id: id.to_string(),
        })?;
        pod.current_state.phase = phase;
        Ok(())
    }

    /// Mark a pod terminated with one status per desired container,
    /// carrying the given exit codes.
    pub fn terminate(&self, id: &str, exit_codes: &[i32]) -> StoreResult<()> {
        let mut pods = self.lock();
        let pod = pods.get_mut(id).ok_or(StoreError::NotFound {
            kind: "Pod",
            id: id.to_string(),
        })?;
        pod.current_state.phase = PodPhase::Terminated;
        pod.current_state.container_statuses = pod
            .desired_state
            .manifest
            .containers
            .iter()
            .zip(exit_codes)
            .map(|(container, code)| ContainerStatus {
                name: container.name.clone(),
                termination: Some(Termination { exit_code: *code }),
            })
            .collect();
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }
}

#[async_trait]
impl PodClient for MemoryPods {
    async fn create_pod(&self, pod: Pod) -> StoreResult<Pod> {
        let mut pods = self.lock();
        if pods.contains_key(&pod.id) {
            return Err(StoreError::AlreadyExists {
                kind: "Pod",
                id: pod.id.clone(),
            });
        }
        debug!(id = %pod.id, "pod created");
        pods.insert(pod.id.clone(), pod.clone());
        Ok(pod)
    }

    async fn get_pod(&self, id: &str) -> StoreResult<Pod> {
        self.lock().get(id).cloned().ok_or(StoreError::NotFound {
            kind: "Pod",
            id: id.to_string(),
        })
    }

    async fn delete_pod(&self, id: &str) -> StoreResult<()> {
        match self.lock().remove(id) {
            Some(_) => {
                debug!(id, "pod deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "Pod",
                id: id.to_string(),
            }),
        }
    }
}
