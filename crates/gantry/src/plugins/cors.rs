//! CORS preflight synthesis.
//!
//! For every API whose specification enables `x-gantry.cors`, adds an
//! `OPTIONS` endpoint to each exposed path that does not declare one. The
//! endpoint answers preflight requests from an API Gateway `mock`
//! integration.
//!
//! ```yaml
//! x-gantry:
//!   cors: true            # or:
//!   cors:
//!     origin: "https://app.example.com"
//!     headers: [Content-Type, Authorization]
//!     methods: [GET, POST, OPTIONS]
//!     max_age: 600
//! ```

use std::sync::Arc;

use gantry_spec::{Api, Endpoint, HttpMethod, EXTENSION_KEY};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::hooks::{AttachStage, HookError, HookEvent, HookRegistry, Plugin};
use crate::injector::INTEGRATION_KEY;

const SYNTHESIZED_BY: &str = "cors";

/// Methods a browser may use against an `ANY` endpoint.
const ANY_METHODS: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

/// `x-gantry.cors` when given as an object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsSettings {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,
    /// Allowed methods; derived from the path's endpoints when empty.
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default = "default_max_age")]
    pub max_age: u32,
}

fn default_origin() -> String {
    "*".to_string()
}

fn default_headers() -> Vec<String> {
    [
        "Content-Type",
        "X-Amz-Date",
        "Authorization",
        "X-Api-Key",
        "X-Amz-Security-Token",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_age() -> u32 {
    3600
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            headers: default_headers(),
            methods: Vec::new(),
            max_age: default_max_age(),
        }
    }
}

impl CorsSettings {
    /// Settings of `api`, or `None` when CORS is not enabled.
    pub fn for_api(api: &Api) -> Result<Option<Self>, HookError> {
        match api.extension().and_then(|ext| ext.get("cors")) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
            Some(Value::Bool(true)) => Ok(Some(Self::default())),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                HookError::callback(format!(
                    "invalid x-gantry.cors settings in API '{}': {e}",
                    api.identifier()
                ))
            }),
        }
    }
}

/// Built-in plugin adding CORS preflight endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsPlugin;

impl Plugin for CorsPlugin {
    fn name(&self) -> &str {
        "cors"
    }

    fn register(&self, hooks: &mut HookRegistry) -> Result<(), HookError> {
        hooks.on(HookEvent::AfterAddEndpointsToApis, |mut stage: AttachStage| async move {
            for api in &mut stage.apis {
                let added = add_preflight_endpoints(api)?;
                if added > 0 {
                    tracing::debug!(api = %api.identifier(), added, "CORS preflight endpoints added");
                }
            }
            Ok::<_, HookError>(stage)
        })
    }
}

/// Add (or refresh) a preflight endpoint on every path of `api` lacking a
/// user-declared `OPTIONS` endpoint. Returns how many were attached.
pub fn add_preflight_endpoints(api: &mut Api) -> Result<usize, HookError> {
    let Some(settings) = CorsSettings::for_api(api)? else {
        return Ok(0);
    };

    let mut preflights = Vec::new();
    for path in api.paths() {
        let user_declared = api
            .endpoints()
            .find(|e| e.path() == path && e.method() == HttpMethod::Options)
            .is_some_and(|e| !is_synthesized(e));
        if user_declared {
            continue;
        }
        let methods = if settings.methods.is_empty() {
            allowed_methods(api, path)
        } else {
            settings.methods.clone()
        };
        preflights.push(preflight_endpoint(api.identifier(), path, &settings, &methods)?);
    }

    let count = preflights.len();
    for endpoint in preflights {
        api.add_endpoint(Arc::new(endpoint), true)
            .map_err(|e| HookError::callback(e.to_string()))?;
    }
    Ok(count)
}

fn is_synthesized(endpoint: &Endpoint) -> bool {
    endpoint
        .extension()
        .and_then(|ext| ext.get("synthesized"))
        .and_then(Value::as_str)
        == Some(SYNTHESIZED_BY)
}

fn allowed_methods(api: &Api, path: &str) -> Vec<String> {
    let mut methods: Vec<&str> = Vec::new();
    for endpoint in api.endpoints().filter(|e| e.path() == path) {
        match endpoint.method() {
            HttpMethod::Any => methods.extend_from_slice(ANY_METHODS),
            method => methods.push(method.as_str()),
        }
    }
    methods.push(HttpMethod::Options.as_str());
    methods.sort_unstable();
    methods.dedup();
    methods.into_iter().map(String::from).collect()
}

fn path_parameters(path: &str) -> Vec<Value> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| {
            json!({
                "name": name.trim_end_matches('+'),
                "in": "path",
                "required": true,
                "type": "string"
            })
        })
        .collect()
}

fn preflight_endpoint(
    api_identifier: &str,
    path: &str,
    settings: &CorsSettings,
    methods: &[String],
) -> Result<Endpoint, HookError> {
    let allowed = [
        ("Access-Control-Allow-Origin", settings.origin.clone()),
        ("Access-Control-Allow-Headers", settings.headers.join(",")),
        ("Access-Control-Allow-Methods", methods.join(",")),
        ("Access-Control-Max-Age", settings.max_age.to_string()),
    ];

    let mut response_headers = Map::new();
    let mut response_parameters = Map::new();
    for (header, value) in &allowed {
        response_headers.insert((*header).to_string(), json!({"type": "string"}));
        response_parameters.insert(
            format!("method.response.header.{header}"),
            json!(format!("'{value}'")),
        );
    }

    let spec = json!({
        EXTENSION_KEY: {"apis": [api_identifier], "synthesized": SYNTHESIZED_BY},
        "summary": "CORS preflight",
        "consumes": ["application/json"],
        "produces": ["application/json"],
        "responses": {
            "200": {"description": "CORS preflight response", "headers": response_headers}
        },
        INTEGRATION_KEY: {
            "type": "mock",
            "requestTemplates": {"application/json": "{\"statusCode\": 200}"},
            "passthroughBehavior": "when_no_match",
            "responses": {
                "default": {"statusCode": "200", "responseParameters": response_parameters}
            }
        }
    });
    let mut endpoint = Endpoint::new(spec, path, HttpMethod::Options.as_str())
        .map_err(|e| HookError::callback(e.to_string()))?;
    let parameters = path_parameters(path);
    if !parameters.is_empty() {
        endpoint.set_field("parameters", Value::Array(parameters));
    }
    Ok(endpoint)
}
