//! Signed clients for the AWS services a deployment touches.
//!
//! Each service sits behind a trait ([`ApiGatewayProvider`],
//! [`FunctionProvider`], [`RoleResolver`]) so that the pipeline can run
//! against in-memory doubles.

mod apigateway;
mod client;
mod iam;
mod lambda;

pub use apigateway::{ApiGatewayProvider, AwsApiGateway, RemoteDeployment};
pub use client::{credentials_from_env, AwsClient};
pub use iam::{IamRoleResolver, RoleResolver};
pub use lambda::{
    AliasConfiguration, AwsFunctions, FunctionCode, FunctionConfiguration, FunctionParams,
    FunctionProvider,
};

use thiserror::Error;

const NOT_FOUND_CODES: &[&str] = &[
    "NotFoundException",
    "ResourceNotFoundException",
    "NoSuchEntity",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDeniedException",
    "AccessDenied",
    "UnrecognizedClientException",
    "InvalidSignatureException",
];

/// Errors returned by provider clients.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{operation}: resource not found: {message}")]
    NotFound { operation: String, message: String },

    #[error("{operation}: access denied: {message}")]
    AccessDenied { operation: String, message: String },

    #[error("{operation} rejected ({status} {code}): {message}")]
    Rejected {
        operation: String,
        status: u16,
        code: String,
        message: String,
    },

    #[error("{operation} failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response to {operation}: {message}")]
    Decode { operation: String, message: String },

    #[error("AWS credentials not found: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")]
    MissingCredentials,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProviderError {
    /// Classify an error response from its status and service error code.
    pub fn from_response(operation: &str, status: u16, code: &str, message: &str) -> Self {
        let operation = operation.to_string();
        let message = message.to_string();
        if status == 404 || NOT_FOUND_CODES.contains(&code) {
            ProviderError::NotFound { operation, message }
        } else if status == 403 || ACCESS_DENIED_CODES.contains(&code) {
            ProviderError::AccessDenied { operation, message }
        } else {
            ProviderError::Rejected {
                operation,
                status,
                code: code.to_string(),
                message,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, ProviderError::AccessDenied { .. })
    }

    /// Whether the remote resource was busy with a previous update.
    pub fn is_conflict(&self) -> bool {
        match self {
            ProviderError::Rejected { status, code, .. } => {
                *status == 409 || code == "ResourceConflictException" || code == "ConflictException"
            }
            _ => false,
        }
    }
}
