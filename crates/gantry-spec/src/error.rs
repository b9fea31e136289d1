use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading or assembling specifications.
#[derive(Debug, Error)]
pub enum SpecError {
    /// A fragment exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fragment exists but is not a valid YAML/JSON mapping.
    #[error("malformed specification {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Two endpoint directories resolve to the same path and method.
    #[error("endpoint {method} {path} is declared more than once ({first} and {second})")]
    DuplicateEndpoint {
        method: String,
        path: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Two API directories resolve to the same identifier.
    #[error("API '{0}' is declared more than once")]
    DuplicateApi(String),

    /// An API already exposes an endpoint for this path and method.
    #[error("API '{api}' already exposes {method} {path}")]
    DuplicateMethod {
        api: String,
        method: String,
        path: String,
    },

    /// Resource path does not start with `/` or has an empty segment.
    #[error("invalid resource path '{0}'")]
    InvalidPath(String),

    /// Not one of the supported HTTP methods.
    #[error("unsupported HTTP method '{0}'")]
    InvalidMethod(String),

    /// Not one of `doc`, `aws`, `complete`.
    #[error("unknown specification view '{0}' (expected doc, aws or complete)")]
    InvalidView(String),
}
