//! Shared SigV4 transport.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gantry_sigv4::{sign, Credentials, RequestParts, Scope, Timestamp};
use reqwest::{Client, Method, Url};
use serde_json::Value;

use super::ProviderError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
/// the optional `AWS_SESSION_TOKEN`.
pub fn credentials_from_env() -> Result<Credentials, ProviderError> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    match (var("AWS_ACCESS_KEY_ID"), var("AWS_SECRET_ACCESS_KEY")) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token: var("AWS_SESSION_TOKEN"),
        }),
        _ => Err(ProviderError::MissingCredentials),
    }
}

/// Signs and sends JSON requests to AWS service endpoints.
///
/// Cheap to clone; every service client holds one.
#[derive(Debug, Clone)]
pub struct AwsClient {
    http: Client,
    credentials: Credentials,
    endpoint_override: Option<String>,
}

/// One call to an AWS REST or query API.
pub(crate) struct AwsRequest<'a> {
    /// AWS operation name, used in errors and logs.
    pub operation: &'a str,
    /// Signing name of the service.
    pub service: &'a str,
    pub region: &'a str,
    /// Default host, replaced by the endpoint override when one is set.
    pub host: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'a str, String)>,
    pub body: Option<Value>,
}

impl AwsClient {
    pub fn new(credentials: Credentials) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ProviderError::Client)?;
        Ok(Self {
            http,
            credentials,
            endpoint_override: None,
        })
    }

    /// Send every request to `base_url` instead of the regional AWS host.
    pub fn with_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint_override = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Send a signed request. A successful empty body decodes to `Null`.
    pub(crate) async fn send(&self, request: AwsRequest<'_>) -> Result<Value, ProviderError> {
        let operation = request.operation;
        let base = match &self.endpoint_override {
            Some(base) => base.clone(),
            None => format!("https://{}", request.host),
        };
        let base_url = Url::parse(&base).map_err(|e| ProviderError::Decode {
            operation: operation.to_string(),
            message: format!("invalid endpoint '{base}': {e}"),
        })?;
        let host = match (base_url.host_str(), base_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => request.host.clone(),
        };

        let payload = match &request.body {
            Some(body) => serde_json::to_vec(body).map_err(|e| ProviderError::Decode {
                operation: operation.to_string(),
                message: e.to_string(),
            })?,
            None => Vec::new(),
        };
        let query: Vec<(&str, &str)> = request
            .query
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        let mut headers = vec![("accept", "application/json")];
        if request.body.is_some() {
            headers.push(("content-type", "application/json"));
        }

        let signed = sign(
            &RequestParts {
                method: request.method.as_str(),
                path: &request.path,
                query: &query,
                host: &host,
                headers: &headers,
                payload: &payload,
            },
            &self.credentials,
            &Scope {
                region: request.region,
                service: request.service,
            },
            &Timestamp::from_unix(unix_now()),
        );

        let url = format!("{base}{}", signed.path_and_query());
        let mut builder = self.http.request(request.method.clone(), &url);
        for (name, value) in headers.iter().copied() {
            builder = builder.header(name, value);
        }
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.body.is_some() {
            builder = builder.body(payload);
        }

        tracing::debug!(operation, method = %request.method, path = %request.path, "aws request");
        let transport = |source| ProviderError::Transport {
            operation: operation.to_string(),
            source,
        };
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(transport)?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode {
                operation: operation.to_string(),
                message: e.to_string(),
            });
        }

        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        let (code, message) = error_details(&body, error_type.as_deref());
        Err(ProviderError::from_response(
            operation,
            status.as_u16(),
            &code,
            &message,
        ))
    }
}

/// Pull the service error code and message out of the shapes used by
/// API Gateway (`message`, `__type`), Lambda (`Type`, `Message`,
/// `x-amzn-ErrorType`) and IAM (`Error.Code`, `Error.Message`).
fn error_details(body: &Value, error_type: Option<&str>) -> (String, String) {
    let nested = body.get("Error");
    let field = |names: &[&str]| {
        names.iter().find_map(|name| {
            body.get(*name)
                .or_else(|| nested.and_then(|n| n.get(*name)))
                .and_then(Value::as_str)
        })
    };

    let code = error_type
        .or_else(|| field(&["__type", "code", "Code"]))
        .map(|raw| {
            // `NotFoundException:http://...` or `com.amazon...#NotFoundException`
            let raw = raw.split(':').next().unwrap_or(raw);
            raw.rsplit('#').next().unwrap_or(raw).to_string()
        })
        .unwrap_or_default();
    let message = field(&["message", "Message"]).unwrap_or_default().to_string();
    (code, message)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
