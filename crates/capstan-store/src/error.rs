//! Store error taxonomy.
//!
//! `NotFound` is a benign branch for the generator and the deployment
//! controller; `AlreadyExists` marks a lost create race and is swallowed;
//! `Conflict` marks a lost compare-and-set and is resolved by the next
//! watch event; `Invalid` is surfaced verbatim and never retried.

use capstan_core::validation::ValidationError;
use thiserror::Error;

/// Errors returned by store and pod clients.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("{kind} update conflict on {id}: expected resource version {expected}, got {actual}")]
    Conflict {
        kind: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("store transport error: {0}")]
    Transport(String),

    #[error("store is shut down")]
    Closed,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
