//! Write-time validation for configs and deployments.
//!
//! The store applies these on every create and update; a failure is
//! surfaced to the caller verbatim and never retried.

use thiserror::Error;

use crate::types::{
    Deployment, DeploymentConfig, DeploymentStrategy, DeploymentTrigger,
    DEPLOYMENT_CONFIG_ID_LABEL,
};

/// A rejected write, listing the offending field paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {}", errors.join(", "))]
pub struct ValidationError {
    pub kind: &'static str,
    pub errors: Vec<String>,
}

fn check(kind: &'static str, errors: Vec<String>) -> Result<(), ValidationError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { kind, errors })
    }
}

fn validate_strategy(strategy: &DeploymentStrategy, prefix: &str, errors: &mut Vec<String>) {
    if let DeploymentStrategy::CustomPod(params) = strategy {
        if params.image.is_empty() {
            errors.push(format!("{prefix}.customPod.image: required"));
        }
    }
}

/// A config is rejected unless every image-change trigger names a
/// repository and a tag, and its strategy is well-formed.
pub fn validate_deployment_config(config: &DeploymentConfig) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    if config.id.is_empty() {
        errors.push("id: required".to_string());
    }

    for (i, trigger) in config.triggers.iter().enumerate() {
        if let DeploymentTrigger::ImageChange(params) = trigger {
            if params.repository_name.is_empty() {
                errors.push(format!("triggers[{i}].imageChangeParams.repositoryName: required"));
            }
            if params.tag.is_empty() {
                errors.push(format!("triggers[{i}].imageChangeParams.tag: required"));
            }
        }
    }

    validate_strategy(&config.template.strategy, "template.strategy", &mut errors);

    check("DeploymentConfig", errors)
}

/// A deployment is rejected unless it carries the config-id label.
///
/// The strategy's type is the enum discriminant and always present; the
/// customPod image requirement binds configs only, not the deployments
/// cut from them.
pub fn validate_deployment(deployment: &Deployment) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    if deployment.id.is_empty() {
        errors.push("id: required".to_string());
    }

    if deployment.config_id().is_none() {
        errors.push(format!("labels.{DEPLOYMENT_CONFIG_ID_LABEL}: required"));
    }

    check("Deployment", errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomPodParams, DeploymentTemplate, ImageChangeParams};

    fn valid_config() -> DeploymentConfig {
        DeploymentConfig {
            id: "c1".to_string(),
            triggers: vec![DeploymentTrigger::ImageChange(ImageChangeParams {
                automatic: true,
                repository_name: "reg/app".to_string(),
                tag: "prod".to_string(),
                ..ImageChangeParams::default()
            })],
            template: DeploymentTemplate {
                strategy: DeploymentStrategy::CustomPod(CustomPodParams {
                    image: "reg/deployer:v1".to_string(),
                    environment: vec![],
                }),
                ..DeploymentTemplate::default()
            },
            ..DeploymentConfig::default()
        }
    }

    fn valid_deployment() -> Deployment {
        let mut deployment = Deployment {
            id: "c1-1".to_string(),
            strategy: DeploymentStrategy::CustomPod(CustomPodParams {
                image: "reg/deployer:v1".to_string(),
                environment: vec![],
            }),
            ..Deployment::default()
        };
        deployment
            .labels
            .insert(DEPLOYMENT_CONFIG_ID_LABEL.to_string(), "c1".to_string());
        deployment
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_deployment_config(&valid_config()).is_ok());
    }

    #[test]
    fn image_trigger_requires_repository_and_tag() {
        let mut config = valid_config();
        config.triggers = vec![DeploymentTrigger::ImageChange(ImageChangeParams::default())];

        let err = validate_deployment_config(&config).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err.errors[0].contains("repositoryName"));
        assert!(err.errors[1].contains("tag"));
    }

    #[test]
    fn custom_pod_strategy_requires_image() {
        let mut config = valid_config();
        config.template.strategy = DeploymentStrategy::CustomPod(CustomPodParams::default());

        let err = validate_deployment_config(&config).unwrap_err();
        assert!(err.to_string().contains("template.strategy.customPod.image"));
    }

    #[test]
    fn basic_strategy_needs_no_image() {
        let mut config = valid_config();
        config.template.strategy = DeploymentStrategy::Basic;
        assert!(validate_deployment_config(&config).is_ok());
    }

    #[test]
    fn valid_deployment_passes() {
        assert!(validate_deployment(&valid_deployment()).is_ok());
    }

    #[test]
    fn deployment_requires_config_id_label() {
        let mut deployment = valid_deployment();
        deployment.labels.clear();

        let err = validate_deployment(&deployment).unwrap_err();
        assert!(err.to_string().contains(DEPLOYMENT_CONFIG_ID_LABEL));
    }

    #[test]
    fn deployment_strategy_image_is_not_checked() {
        // The customPod image requirement applies to configs; a labeled
        // deployment is accepted even with an empty deployer image.
        let mut deployment = valid_deployment();
        deployment.strategy = DeploymentStrategy::CustomPod(CustomPodParams::default());
        assert!(validate_deployment(&deployment).is_ok());

        deployment.strategy = DeploymentStrategy::Basic;
        assert!(validate_deployment(&deployment).is_ok());
    }
}
