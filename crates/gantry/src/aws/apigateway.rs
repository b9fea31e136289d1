//! API Gateway (REST APIs, v1).

use async_trait::async_trait;
use gantry_spec::RemoteApi;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::client::{AwsClient, AwsRequest};
use super::ProviderError;

const SERVICE: &str = "apigateway";
const PAGE_SIZE: &str = "500";

/// A deployment snapshot of a REST API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteDeployment {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Remote REST API operations the pipeline needs.
#[async_trait]
pub trait ApiGatewayProvider: Send + Sync {
    /// Find a REST API by exact name.
    async fn find_rest_api(&self, region: &str, name: &str)
        -> Result<Option<RemoteApi>, ProviderError>;

    /// Import `spec` as a new REST API.
    async fn create_rest_api(&self, region: &str, spec: &Value) -> Result<RemoteApi, ProviderError>;

    /// Overwrite an existing REST API with `spec`.
    async fn update_rest_api(
        &self,
        region: &str,
        rest_api_id: &str,
        spec: &Value,
    ) -> Result<RemoteApi, ProviderError>;

    /// Snapshot the current definition into `stage`.
    async fn create_deployment(
        &self,
        region: &str,
        rest_api_id: &str,
        stage: &str,
        description: &str,
    ) -> Result<RemoteDeployment, ProviderError>;
}

/// [`ApiGatewayProvider`] backed by the API Gateway REST API.
#[derive(Debug, Clone)]
pub struct AwsApiGateway {
    client: AwsClient,
}

#[derive(Debug, Deserialize)]
struct RestApiPage {
    #[serde(default)]
    item: Vec<RemoteApi>,
    #[serde(default)]
    position: Option<String>,
}

impl AwsApiGateway {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    fn request<'a>(
        operation: &'a str,
        region: &'a str,
        method: Method,
        path: String,
    ) -> AwsRequest<'a> {
        AwsRequest {
            operation,
            service: SERVICE,
            region,
            host: format!("apigateway.{region}.amazonaws.com"),
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(operation: &str, value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::Decode {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl ApiGatewayProvider for AwsApiGateway {
    async fn find_rest_api(
        &self,
        region: &str,
        name: &str,
    ) -> Result<Option<RemoteApi>, ProviderError> {
        let mut position: Option<String> = None;
        loop {
            let mut request =
                Self::request("GetRestApis", region, Method::GET, "/restapis".to_string());
            request.query.push(("limit", PAGE_SIZE.to_string()));
            if let Some(position) = &position {
                request.query.push(("position", position.clone()));
            }
            let page: RestApiPage = decode("GetRestApis", self.client.send(request).await?)?;
            if let Some(found) = page.item.into_iter().find(|api| api.name == name) {
                return Ok(Some(found));
            }
            match page.position {
                Some(next) if Some(&next) != position.as_ref() => position = Some(next),
                _ => return Ok(None),
            }
        }
    }

    async fn create_rest_api(&self, region: &str, spec: &Value) -> Result<RemoteApi, ProviderError> {
        let mut request =
            Self::request("ImportRestApi", region, Method::POST, "/restapis".to_string());
        request.query.push(("mode", "import".to_string()));
        request.query.push(("failonwarnings", "false".to_string()));
        request.body = Some(spec.clone());
        decode("ImportRestApi", self.client.send(request).await?)
    }

    async fn update_rest_api(
        &self,
        region: &str,
        rest_api_id: &str,
        spec: &Value,
    ) -> Result<RemoteApi, ProviderError> {
        let mut request = Self::request(
            "PutRestApi",
            region,
            Method::PUT,
            format!("/restapis/{rest_api_id}"),
        );
        request.query.push(("mode", "overwrite".to_string()));
        request.query.push(("failonwarnings", "false".to_string()));
        request.body = Some(spec.clone());
        decode("PutRestApi", self.client.send(request).await?)
    }

    async fn create_deployment(
        &self,
        region: &str,
        rest_api_id: &str,
        stage: &str,
        description: &str,
    ) -> Result<RemoteDeployment, ProviderError> {
        let mut request = Self::request(
            "CreateDeployment",
            region,
            Method::POST,
            format!("/restapis/{rest_api_id}/deployments"),
        );
        request.body = Some(json!({
            "stageName": stage,
            "description": description,
        }));
        decode("CreateDeployment", self.client.send(request).await?)
    }
}
