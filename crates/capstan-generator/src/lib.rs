//! Candidate generation for deployment configs.
//!
//! The generator derives the next version of a `DeploymentConfig` from
//! three inputs: the stored config, the latest deployment realized from
//! it, and the current image-repository state. It resolves image-change
//! trigger references into concrete container images, then bumps
//! `latest_version` only when the effective pod template actually
//! changed. It never persists; callers write the candidate back.
//!
//! That bump-only-on-real-change rule is what makes every controller's
//! bootstrap reprocessing idempotent: regenerating an already-converged
//! config yields the config unchanged.

pub mod generator;

pub use generator::{ConfigRegenerator, DeploymentConfigGenerator, GeneratorError, GeneratorResult};
