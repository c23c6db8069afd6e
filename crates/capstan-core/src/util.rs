//! Id derivation, image-reference parsing, and template equality.

use std::collections::{BTreeMap, BTreeSet};

use crate::pod::PodTemplate;
use crate::types::{Deployment, DeploymentConfig, DeploymentTrigger};

/// The id of the deployment realizing `config` at its latest version:
/// `<configId>-<latestVersion>`.
pub fn latest_deployment_id(config: &DeploymentConfig) -> String {
    format!("{}-{}", config.id, config.latest_version)
}

/// Split an image reference at its last `:` into `(name, revision)`.
///
/// Returns `None` for references carrying no revision.
pub fn parse_image(image: &str) -> Option<(&str, &str)> {
    image.rsplit_once(':')
}

/// Map of repository name to the revision a deployment's containers reference.
pub fn referenced_images(deployment: &Deployment) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for container in &deployment
        .controller_template
        .pod_template
        .desired_state
        .manifest
        .containers
    {
        if let Some((name, revision)) = parse_image(&container.image) {
            result.insert(name.to_string(), revision.to_string());
        }
    }
    result
}

/// Repository names a config's image-change triggers reference.
pub fn referenced_repos(config: &DeploymentConfig) -> BTreeSet<String> {
    config
        .triggers
        .iter()
        .filter_map(|t| match t {
            DeploymentTrigger::ImageChange(params) => Some(params.repository_name.clone()),
            _ => None,
        })
        .collect()
}

/// Structural deep equality over the pod-template subtree.
///
/// Absent optional fields deserialize to their zero values, so two
/// templates differing only in field presence compare equal.
pub fn pod_templates_equal(a: &PodTemplate, b: &PodTemplate) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{Container, ContainerManifest, PodState};
    use crate::types::{ControllerTemplate, ImageChangeParams};

    fn template_with_image(image: &str) -> PodTemplate {
        PodTemplate {
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
        }
    }

    #[test]
    fn latest_deployment_id_derivation() {
        let config = DeploymentConfig {
            id: "c1".to_string(),
            latest_version: 3,
            ..DeploymentConfig::default()
        };
        assert_eq!(latest_deployment_id(&config), "c1-3");
    }

    #[test]
    fn parse_image_splits_at_last_colon() {
        assert_eq!(parse_image("reg/app:r1"), Some(("reg/app", "r1")));
        assert_eq!(
            parse_image("registry:5000/app:r1"),
            Some(("registry:5000/app", "r1"))
        );
        assert_eq!(parse_image("no-revision"), None);
    }

    #[test]
    fn referenced_images_maps_name_to_revision() {
        let deployment = Deployment {
            id: "c1-1".to_string(),
            controller_template: ControllerTemplate {
                pod_template: template_with_image("reg/app:r1"),
                ..ControllerTemplate::default()
            },
            ..Deployment::default()
        };
        let images = referenced_images(&deployment);
        assert_eq!(images.get("reg/app").map(String::as_str), Some("r1"));
    }

    #[test]
    fn referenced_repos_collects_all_image_change_triggers() {
        let config = DeploymentConfig {
            id: "c1".to_string(),
            triggers: vec![
                DeploymentTrigger::Manual,
                DeploymentTrigger::ImageChange(ImageChangeParams {
                    automatic: false,
                    repository_name: "reg/a".to_string(),
                    tag: "latest".to_string(),
                    ..ImageChangeParams::default()
                }),
                DeploymentTrigger::ImageChange(ImageChangeParams {
                    automatic: true,
                    repository_name: "reg/b".to_string(),
                    tag: "prod".to_string(),
                    ..ImageChangeParams::default()
                }),
            ],
            ..DeploymentConfig::default()
        };
        let repos = referenced_repos(&config);
        assert!(repos.contains("reg/a"));
        assert!(repos.contains("reg/b"));
        assert_eq!(repos.len(), 2);
    }

    #[test]
    fn deep_copy_is_equal() {
        let template = template_with_image("reg/app:r1");
        assert!(pod_templates_equal(&template.clone(), &template));
    }

    #[test]
    fn differing_images_are_not_equal() {
        assert!(!pod_templates_equal(
            &template_with_image("reg/app:r1"),
            &template_with_image("reg/app:r2"),
        ));
    }
}
