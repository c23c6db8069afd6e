//! The deployment-config generator.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use capstan_core::{
    latest_deployment_id, pod_templates_equal, referenced_repos, Deployment, DeploymentConfig,
    ImageRepository, LabelSelector,
};
use capstan_store::{ResourceClient, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from candidate generation.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("deploymentConfig not found: {0}")]
    NotFound(String),

    /// The config references an image repository the store does not know.
    /// Not retried here; a later event on the missing repository
    /// retriggers regeneration.
    #[error("deploymentConfig {config} references unknown image repository {repository}")]
    UnknownImageRepository { config: String, repository: String },

    #[error(transparent)]
    Store(StoreError),
}

pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Capability handed to controllers that regenerate configs.
#[async_trait]
pub trait ConfigRegenerator: Send + Sync {
    /// Derive the candidate next version of the config with `config_id`.
    async fn generate(&self, config_id: &str) -> GeneratorResult<DeploymentConfig>;
}

/// Derives candidate configs from the store's current state.
pub struct DeploymentConfigGenerator {
    configs: Arc<dyn ResourceClient<DeploymentConfig>>,
    deployments: Arc<dyn ResourceClient<Deployment>>,
    image_repos: Arc<dyn ResourceClient<ImageRepository>>,
}

impl DeploymentConfigGenerator {
    pub fn new(
        configs: Arc<dyn ResourceClient<DeploymentConfig>>,
        deployments: Arc<dyn ResourceClient<Deployment>>,
        image_repos: Arc<dyn ResourceClient<ImageRepository>>,
    ) -> Self {
        Self {
            configs,
            deployments,
            image_repos,
        }
    }

    /// Latest deployment for `config`, with `NotFound` as a benign branch.
    async fn latest_deployment(
        &self,
        config: &DeploymentConfig,
    ) -> GeneratorResult<Option<Deployment>> {
        match self.deployments.get(&latest_deployment_id(config)).await {
            Ok(deployment) => Ok(Some(deployment)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(GeneratorError::Store(e)),
        }
    }

    /// Current snapshots of the repositories `config` references, keyed by
    /// canonical repository name.
    async fn referenced_repositories(
        &self,
        config: &DeploymentConfig,
    ) -> GeneratorResult<BTreeMap<String, ImageRepository>> {
        let referenced = referenced_repos(config);
        if referenced.is_empty() {
            return Ok(BTreeMap::new());
        }

        let (repos, _) = self
            .image_repos
            .list(&LabelSelector::everything())
            .await
            .map_err(GeneratorError::Store)?;

        let by_name: BTreeMap<String, ImageRepository> = repos
            .into_iter()
            .filter(|repo| referenced.contains(&repo.docker_image_repository))
            .map(|repo| (repo.docker_image_repository.clone(), repo))
            .collect();

        for name in &referenced {
            if !by_name.contains_key(name) {
                return Err(GeneratorError::UnknownImageRepository {
                    config: config.id.clone(),
                    repository: name.clone(),
                });
            }
        }

        Ok(by_name)
    }

    /// Substitute the trigger-resolved image into every matching container
    /// of the candidate's pod template.
    fn apply_image_triggers(
        candidate: &mut DeploymentConfig,
        repos: &BTreeMap<String, ImageRepository>,
    ) {
        for repo in repos.values() {
            let Some(params) = candidate
                .image_trigger_for_repo(&repo.docker_image_repository)
                .cloned()
            else {
                continue;
            };

            let Some(revision) = repo.tags.get(&params.tag) else {
                warn!(
                    config = %candidate.id,
                    repository = %repo.docker_image_repository,
                    tag = %params.tag,
                    "referenced tag missing from repository, skipping"
                );
                continue;
            };

            let new_image = format!("{}:{}", repo.docker_image_repository, revision);
            for container in &mut candidate
                .template
                .controller_template
                .pod_template
                .desired_state
                .manifest
                .containers
            {
                if params.container_names.contains(&container.name) && container.image != new_image
                {
                    container.image = new_image.clone();
                }
            }
        }
    }
}

#[async_trait]
impl ConfigRegenerator for DeploymentConfigGenerator {
    async fn generate(&self, config_id: &str) -> GeneratorResult<DeploymentConfig> {
        let config = match self.configs.get(config_id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                return Err(GeneratorError::NotFound(config_id.to_string()))
            }
            Err(e) => return Err(GeneratorError::Store(e)),
        };

        let latest = self.latest_deployment(&config).await?;
        let repos = self.referenced_repositories(&config).await?;

        let mut candidate = config.clone();
        Self::apply_image_triggers(&mut candidate, &repos);

        match &latest {
            None => {
                if config.latest_version == 0 {
                    // First version for a never-deployed config.
                    candidate.latest_version = 1;
                }
                // A non-zero version with no deployment means the
                // deployment-config controller hasn't caught up; leave the
                // version alone and let it.
            }
            Some(latest) => {
                if !pod_templates_equal(
                    &candidate.template.controller_template.pod_template,
                    &latest.controller_template.pod_template,
                ) {
                    candidate.latest_version = config.latest_version + 1;
                }
            }
        }

        debug!(
            config = %config.id,
            from = config.latest_version,
            to = candidate.latest_version,
            "generated candidate config"
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::pod::{Container, ContainerManifest, PodState, PodTemplate};
    use capstan_core::types::{
        ControllerTemplate, DeploymentTemplate, DeploymentTrigger, ImageChangeParams,
        DEPLOYMENT_CONFIG_ID_LABEL,
    };
    use capstan_store::MemoryRegistry;

    struct Fixture {
        configs: MemoryRegistry<DeploymentConfig>,
        deployments: MemoryRegistry<Deployment>,
        image_repos: MemoryRegistry<ImageRepository>,
        generator: DeploymentConfigGenerator,
    }

    fn fixture() -> Fixture {
        let configs = MemoryRegistry::new();
        let deployments = MemoryRegistry::new();
        let image_repos = MemoryRegistry::new();
        let generator = DeploymentConfigGenerator::new(
            Arc::new(configs.clone()),
            Arc::new(deployments.clone()),
            Arc::new(image_repos.clone()),
        );
        Fixture {
            configs,
            deployments,
            image_repos,
            generator,
        }
    }

    fn template_with_image(image: &str) -> DeploymentTemplate {
        DeploymentTemplate {
            controller_template: ControllerTemplate {
                replicas: 1,
                pod_template: PodTemplate {
                    desired_state: PodState {
                        manifest: ContainerManifest {
                            version: "v1".to_string(),
                            containers: vec![Container {
                                name: "a".to_string(),
                                image: image.to_string(),
                                env: vec![],
                            }],
                        },
                        ..PodState::default()
                    },
                    ..PodTemplate::default()
                },
                ..ControllerTemplate::default()
            },
            ..DeploymentTemplate::default()
        }
    }

    fn config_with_image_trigger(id: &str, repo: &str, tag: &str, image: &str) -> DeploymentConfig {
        DeploymentConfig {
            id: id.to_string(),
            triggers: vec![DeploymentTrigger::ImageChange(ImageChangeParams {
                automatic: true,
                container_names: vec!["a".to_string()],
                repository_name: repo.to_string(),
                tag: tag.to_string(),
            })],
            template: template_with_image(image),
            ..DeploymentConfig::default()
        }
    }

    fn repo(name: &str, tags: &[(&str, &str)]) -> ImageRepository {
        ImageRepository {
            id: name.to_string(),
            docker_image_repository: name.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..ImageRepository::default()
        }
    }

    fn deployment_for(config: &DeploymentConfig) -> Deployment {
        let mut deployment = Deployment {
            id: latest_deployment_id(config),
            strategy: config.template.strategy.clone(),
            controller_template: config.template.controller_template.clone(),
            ..Deployment::default()
        };
        deployment
            .labels
            .insert(DEPLOYMENT_CONFIG_ID_LABEL.to_string(), config.id.clone());
        deployment
    }

    #[tokio::test]
    async fn missing_config_is_not_found() {
        let f = fixture();
        let err = f.generator.generate("nope").await.unwrap_err();
        assert!(matches!(err, GeneratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn first_version_bumps_zero_to_one() {
        let f = fixture();
        let config = DeploymentConfig {
            id: "c1".to_string(),
            triggers: vec![DeploymentTrigger::Manual],
            template: template_with_image("reg/img:v1"),
            ..DeploymentConfig::default()
        };
        f.configs.create(config).await.unwrap();

        let candidate = f.generator.generate("c1").await.unwrap();
        assert_eq!(candidate.latest_version, 1);
    }

    #[tokio::test]
    async fn nonzero_version_without_deployment_is_left_alone() {
        let f = fixture();
        let mut config = DeploymentConfig {
            id: "c1".to_string(),
            template: template_with_image("reg/img:v1"),
            ..DeploymentConfig::default()
        };
        config.latest_version = 3;
        f.configs.create(config).await.unwrap();

        let candidate = f.generator.generate("c1").await.unwrap();
        assert_eq!(candidate.latest_version, 3);
    }

    #[tokio::test]
    async fn unknown_referenced_repository_fails() {
        let f = fixture();
        let config = config_with_image_trigger("c1", "reg/app", "prod", "reg/app:r1");
        f.configs.create(config).await.unwrap();

        let err = f.generator.generate("c1").await.unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::UnknownImageRepository { ref repository, .. } if repository == "reg/app"
        ));
    }

    #[tokio::test]
    async fn missing_tag_is_skipped() {
        let f = fixture();
        let config = config_with_image_trigger("c1", "reg/app", "prod", "reg/app:r1");
        f.configs.create(config.clone()).await.unwrap();
        f.image_repos
            .create(repo("reg/app", &[("canary", "x")]))
            .await
            .unwrap();
        f.deployments.create(deployment_for(&config)).await.unwrap();

        // The tag the trigger references does not exist: no substitution,
        // no bump, no error.
        let candidate = f.generator.generate("c1").await.unwrap();
        assert_eq!(candidate.latest_version, 0);
        assert_eq!(
            candidate.template.controller_template.pod_template,
            config.template.controller_template.pod_template
        );
    }

    #[tokio::test]
    async fn tag_move_substitutes_image_and_bumps_version() {
        let f = fixture();
        let mut config = config_with_image_trigger("c2", "reg/app", "prod", "reg/app:r1");
        config.latest_version = 1;
        f.configs.create(config.clone()).await.unwrap();
        f.deployments.create(deployment_for(&config)).await.unwrap();
        f.image_repos
            .create(repo("reg/app", &[("prod", "r2")]))
            .await
            .unwrap();

        let candidate = f.generator.generate("c2").await.unwrap();
        assert_eq!(candidate.latest_version, 2);
        let containers = &candidate
            .template
            .controller_template
            .pod_template
            .desired_state
            .manifest
            .containers;
        assert_eq!(containers[0].image, "reg/app:r2");
    }

    #[tokio::test]
    async fn substitution_is_restricted_to_named_containers() {
        let f = fixture();
        let mut config = config_with_image_trigger("c1", "reg/app", "prod", "reg/app:r1");
        config
            .template
            .controller_template
            .pod_template
            .desired_state
            .manifest
            .containers
            .push(Container {
                name: "sidecar".to_string(),
                image: "reg/app:r1".to_string(),
                env: vec![],
            });
        config.latest_version = 1;
        f.configs.create(config.clone()).await.unwrap();
        f.deployments.create(deployment_for(&config)).await.unwrap();
        f.image_repos
            .create(repo("reg/app", &[("prod", "r2")]))
            .await
            .unwrap();

        let candidate = f.generator.generate("c1").await.unwrap();
        let containers = &candidate
            .template
            .controller_template
            .pod_template
            .desired_state
            .manifest
            .containers;
        assert_eq!(containers[0].image, "reg/app:r2");
        assert_eq!(containers[1].image, "reg/app:r1");
    }

    #[tokio::test]
    async fn no_spurious_bump_when_templates_match() {
        let f = fixture();
        let mut config = config_with_image_trigger("c2", "reg/app", "prod", "reg/app:r1");
        config.latest_version = 1;
        f.configs.create(config.clone()).await.unwrap();
        f.deployments.create(deployment_for(&config)).await.unwrap();
        f.image_repos
            .create(repo("reg/app", &[("prod", "r1")]))
            .await
            .unwrap();

        let candidate = f.generator.generate("c2").await.unwrap();
        assert_eq!(candidate.latest_version, 1);
    }

    #[tokio::test]
    async fn generation_is_a_fixpoint_under_stable_images() {
        let f = fixture();
        let mut config = config_with_image_trigger("c2", "reg/app", "prod", "reg/app:r1");
        config.latest_version = 1;
        f.configs.create(config.clone()).await.unwrap();
        f.deployments.create(deployment_for(&config)).await.unwrap();
        f.image_repos
            .create(repo("reg/app", &[("prod", "r2")]))
            .await
            .unwrap();

        // First generation bumps and rewrites the image.
        let first = f.generator.generate("c2").await.unwrap();
        assert_eq!(first.latest_version, 2);
        f.configs.update(first.clone()).await.unwrap();
        f.deployments.create(deployment_for(&first)).await.unwrap();

        // Regenerating against the converged state changes nothing.
        let second = f.generator.generate("c2").await.unwrap();
        assert_eq!(second.latest_version, first.latest_version);
        assert_eq!(second.template, first.template);
    }
}
