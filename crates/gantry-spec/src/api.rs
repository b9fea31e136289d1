//! A named aggregate of endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::endpoint::{Endpoint, EndpointKey};
use crate::error::SpecError;
use crate::method::HttpMethod;
use crate::view::SpecView;
use crate::EXTENSION_KEY;

/// Swagger version of the aggregate documents.
pub const SWAGGER_VERSION: &str = "2.0";
const DEFAULT_VERSION: &str = "1.0.0";

/// Top-level API spec keys consumed by [`Api::gen_spec`] rather than copied.
const RESERVED_KEYS: &[&str] = &["swagger", "info", "title", "description", "paths"];

/// Lifecycle of an API within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiState {
    Loaded,
    Created,
    Updated,
    Published,
    Failed,
}

impl ApiState {
    /// Whether the remote resource reflects this run's specification.
    pub fn is_deployed(&self) -> bool {
        matches!(self, ApiState::Created | ApiState::Updated | ApiState::Published)
    }
}

/// The remote counterpart of an API, known once it has been deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteApi {
    pub id: String,
    pub name: String,
}

/// An API and the endpoints it exposes.
///
/// Endpoints are shared: the same endpoint may be exposed by several APIs,
/// and its lifecycle belongs to the loader, not to the API.
#[derive(Debug, Clone)]
pub struct Api {
    identifier: String,
    spec: Document,
    endpoints: BTreeMap<EndpointKey, Arc<Endpoint>>,
    state: ApiState,
    remote: Option<RemoteApi>,
}

impl Api {
    /// Build an API from its specification. The identifier comes from
    /// `x-gantry.identifier`, falling back to `fallback_identifier` (the
    /// directory name).
    pub fn new(spec: Document, fallback_identifier: &str) -> Self {
        let identifier = spec
            .get(EXTENSION_KEY)
            .and_then(|ext| ext.get("identifier"))
            .and_then(Value::as_str)
            .unwrap_or(fallback_identifier)
            .to_string();
        Self {
            identifier,
            spec,
            endpoints: BTreeMap::new(),
            state: ApiState::Loaded,
            remote: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The unfiltered API specification (without endpoints).
    pub fn document(&self) -> &Document {
        &self.spec
    }

    /// The `x-gantry` block, if present.
    pub fn extension(&self) -> Option<&Map<String, Value>> {
        self.spec.get(EXTENSION_KEY).and_then(Value::as_object)
    }

    pub fn title(&self) -> &str {
        self.spec
            .get("title")
            .or_else(|| self.spec.get("info").and_then(|info| info.get("title")))
            .and_then(Value::as_str)
            .unwrap_or(&self.identifier)
    }

    /// Attach `endpoint` if it declares this API.
    ///
    /// Returns `Ok(false)` when the endpoint does not belong here. An
    /// existing endpoint with the same path and method is an error unless
    /// `allow_duplicate_method_override` is set, in which case it is replaced.
    pub fn add_endpoint(
        &mut self,
        endpoint: Arc<Endpoint>,
        allow_duplicate_method_override: bool,
    ) -> Result<bool, SpecError> {
        if !endpoint.belongs_to_api(&self.identifier) {
            return Ok(false);
        }
        let key = endpoint.key();
        if self.endpoints.contains_key(&key) && !allow_duplicate_method_override {
            return Err(SpecError::DuplicateMethod {
                api: self.identifier.clone(),
                method: key.1.to_string(),
                path: key.0,
            });
        }
        self.endpoints.insert(key, endpoint);
        Ok(true)
    }

    /// Attached endpoints in (path, method) order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.endpoints.values()
    }

    pub fn has_endpoint(&self, path: &str, method: HttpMethod) -> bool {
        self.endpoints.contains_key(&(path.to_string(), method))
    }

    /// Distinct resource paths exposed by this API, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.endpoints.keys().map(|(p, _)| p.as_str()).collect();
        paths.dedup();
        paths
    }

    /// Build the aggregate Swagger document for `view`.
    ///
    /// Output is deterministic for unchanged inputs: maps are ordered and
    /// endpoints are visited in (path, method) order.
    pub fn gen_spec(&self, view: SpecView) -> Document {
        let filtered = view.apply(&self.spec);
        let mut doc = Map::new();
        doc.insert("swagger".into(), Value::String(SWAGGER_VERSION.into()));

        let mut info = filtered
            .get("info")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(title) = filtered.get("title") {
            info.insert("title".into(), title.clone());
        }
        info.entry("title")
            .or_insert_with(|| Value::String(self.identifier.clone()));
        if let Some(description) = filtered.get("description") {
            info.insert("description".into(), description.clone());
        }
        info.entry("version")
            .or_insert_with(|| Value::String(DEFAULT_VERSION.into()));
        doc.insert("info".into(), Value::Object(info));

        if let Value::Object(map) = &filtered {
            for (key, value) in map {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    doc.insert(key.clone(), value.clone());
                }
            }
        }

        let mut paths = filtered
            .get("paths")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for endpoint in self.endpoints.values() {
            let item = paths
                .entry(endpoint.path().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(operations) = item {
                operations.insert(
                    endpoint.method().operation_key().to_string(),
                    endpoint.spec(view),
                );
            }
        }
        doc.insert("paths".into(), Value::Object(paths));

        Value::Object(doc)
    }

    pub fn state(&self) -> ApiState {
        self.state
    }

    pub fn remote(&self) -> Option<&RemoteApi> {
        self.remote.as_ref()
    }

    /// Record a successful create (`created = true`) or update.
    pub fn mark_deployed(&mut self, remote: RemoteApi, created: bool) {
        self.remote = Some(remote);
        self.state = if created {
            ApiState::Created
        } else {
            ApiState::Updated
        };
    }

    pub fn mark_published(&mut self) {
        self.state = ApiState::Published;
    }

    pub fn mark_failed(&mut self) {
        self.state = ApiState::Failed;
    }
}
