//! Error types of the deployment pipeline.

use std::path::PathBuf;

use gantry_spec::SpecError;
use thiserror::Error;

use crate::aws::ProviderError;
use crate::hooks::HookError;

/// Errors raised while loading or applying integrations.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid lambda configuration in {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    #[error("lambda '{lambda}' is missing required parameter '{field}'")]
    MissingParameter { lambda: String, field: &'static str },

    #[error("lambda '{lambda}': {source}")]
    Provider {
        lambda: String,
        #[source]
        source: ProviderError,
    },

    #[error("endpoint {endpoint} is claimed by both '{first}' and '{second}'")]
    InjectorConflict {
        endpoint: String,
        first: String,
        second: String,
    },

    #[error("integration loader '{loader}' failed: {message}")]
    Loader { loader: String, message: String },
}

/// Errors that abort a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Integration(IntegrationError),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("permission denied during {operation}: {message}. Check that the credentials in use are allowed to call {operation} in this account and region")]
    PermissionDenied { operation: String, message: String },

    #[error("nothing to deploy: {0}")]
    NoDeployableTarget(String),

    #[error("API '{0}' must be deployed before it can be published")]
    NotDeployed(String),

    #[error("invalid project manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },
}

impl From<ProviderError> for DeployError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AccessDenied { operation, message } => {
                DeployError::PermissionDenied { operation, message }
            }
            other => DeployError::Provider(other),
        }
    }
}

impl From<IntegrationError> for DeployError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::Provider { source, lambda } => match source {
                ProviderError::AccessDenied { operation, message } => {
                    DeployError::PermissionDenied {
                        operation,
                        message: format!("{message} (lambda '{lambda}')"),
                    }
                }
                source => DeployError::Integration(IntegrationError::Provider { lambda, source }),
            },
            other => DeployError::Integration(other),
        }
    }
}

impl DeployError {
    /// Whether this error is a permission failure.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, DeployError::PermissionDenied { .. })
    }
}
