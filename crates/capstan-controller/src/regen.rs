//! Shared regenerate-and-write-back step.

use std::sync::Arc;

use capstan_core::DeploymentConfig;
use capstan_generator::{ConfigRegenerator, GeneratorError};
use capstan_store::{ResourceClient, StoreError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegenerateError {
    #[error("generating config: {0}")]
    Generate(#[from] GeneratorError),

    #[error("updating config: {0}")]
    Update(StoreError),
}

/// Generate the candidate next config and write it back.
///
/// A compare-and-set conflict is not an error: another controller won the
/// write, and its update's watch event re-enqueues this config.
pub async fn regenerate_config(
    generator: &Arc<dyn ConfigRegenerator>,
    configs: &Arc<dyn ResourceClient<DeploymentConfig>>,
    config_id: &str,
) -> Result<(), RegenerateError> {
    let candidate = generator.generate(config_id).await?;
    let from = candidate.latest_version;

    match configs.update(candidate).await {
        Ok(updated) => {
            info!(
                config = config_id,
                version = updated.latest_version,
                "regenerated config"
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            debug!(config = config_id, version = from, "lost regeneration race, deferring to next event");
            Ok(())
        }
        Err(e) => Err(RegenerateError::Update(e)),
    }
}
