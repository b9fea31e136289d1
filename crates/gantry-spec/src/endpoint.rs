//! One HTTP method on one resource path.

use std::fmt;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::document::{deep_merge, Document};
use crate::error::SpecError;
use crate::method::HttpMethod;
use crate::view::SpecView;
use crate::EXTENSION_KEY;

/// Identity of an endpoint: resource path and method.
pub type EndpointKey = (String, HttpMethod);

/// An endpoint and its merged specification.
///
/// The specification is mutable so that integration injectors and hooks can
/// attach provider wiring before the endpoint is handed to its APIs.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    path: String,
    method: HttpMethod,
    spec: Document,
}

impl Endpoint {
    /// Build an endpoint. `method` is parsed case-insensitively; `path` must
    /// start with `/` and contain no empty segment.
    pub fn new(spec: Document, path: &str, method: &str) -> Result<Self, SpecError> {
        let method: HttpMethod = method.parse()?;
        validate_path(path)?;
        if !spec.is_object() {
            return Err(SpecError::Malformed {
                path: PathBuf::from(path),
                message: format!("{method} specification must be a mapping"),
            });
        }
        Ok(Self {
            path: path.to_string(),
            method,
            spec,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn key(&self) -> EndpointKey {
        (self.path.clone(), self.method)
    }

    /// The specification filtered by `view`.
    pub fn spec(&self, view: SpecView) -> Document {
        view.apply(&self.spec)
    }

    /// The unfiltered specification.
    pub fn document(&self) -> &Document {
        &self.spec
    }

    /// Deep-merge `patch` into the specification.
    pub fn merge_spec(&mut self, patch: &Document) {
        self.spec = deep_merge(&self.spec, patch);
    }

    /// Set (replace) one top-level field.
    pub fn set_field(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.spec {
            map.insert(key.to_string(), value);
        }
    }

    /// The `x-gantry` block, if present.
    pub fn extension(&self) -> Option<&Map<String, Value>> {
        self.spec.get(EXTENSION_KEY).and_then(Value::as_object)
    }

    /// Whether this endpoint lists `api_identifier` in `x-gantry.apis`.
    pub fn belongs_to_api(&self, api_identifier: &str) -> bool {
        self.extension()
            .and_then(|ext| ext.get("apis"))
            .and_then(Value::as_array)
            .is_some_and(|apis| apis.iter().any(|a| a.as_str() == Some(api_identifier)))
    }

    /// Identifier of the integration target (`x-gantry.lambda`).
    pub fn integration_target(&self) -> Option<&str> {
        self.extension()
            .and_then(|ext| ext.get("lambda"))
            .and_then(Value::as_str)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn validate_path(path: &str) -> Result<(), SpecError> {
    if path == "/" {
        return Ok(());
    }
    let valid = path
        .strip_prefix('/')
        .is_some_and(|rest| rest.split('/').all(|segment| !segment.is_empty()));
    if valid {
        Ok(())
    } else {
        Err(SpecError::InvalidPath(path.to_string()))
    }
}
