//! Error types for vPGM inference.
//!
//! Two families: fatal errors (`ConfigError`, `NotFoundError`) abort before
//! any oracle call, retryable errors (`AttemptError`) are absorbed by the
//! orchestrator until the attempt budget runs out.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractionError;
use crate::oracle::OracleError;
use crate::validate::ValidationError;

/// A configuration, template or dataset file is missing or corrupt.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Lookup by id found nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Template with id '{0}' not found")]
    Template(String),

    #[error("Question '{0}' not found")]
    Record(String),
}

/// One failed attempt. Every variant triggers a fresh oracle call.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("oracle call failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("could not extract JSON: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("instance rejected: {0}")]
    Validation(#[from] ValidationError),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Oracle(_) => "oracle",
            AttemptError::Extraction(_) => "extraction",
            AttemptError::Validation(_) => "validation",
        }
    }
}

/// Top-level error returned by inference entry points.
#[derive(Error, Debug)]
pub enum VpgmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("Inference failed after {attempts} attempts. Last error: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

impl VpgmError {
    /// Number of oracle attempts made before this error, if any were made.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            VpgmError::ExhaustedRetries { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
