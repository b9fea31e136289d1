//! Lambda (REST API `2015-03-31`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::client::{AwsClient, AwsRequest};
use super::ProviderError;

const SERVICE: &str = "lambda";
const API_PREFIX: &str = "/2015-03-31/functions";

/// Configuration parameters of a function, with the role already resolved
/// to an ARN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionParams {
    pub runtime: String,
    pub handler: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", serialize_with = "serialize_environment")]
    pub environment: BTreeMap<String, String>,
}

fn serialize_environment<S: serde::Serializer>(
    variables: &BTreeMap<String, String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    json!({ "Variables": variables }).serialize(serializer)
}

/// A deployment package, sent inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCode {
    pub zip: Vec<u8>,
}

impl FunctionCode {
    fn encoded(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.zip)
    }
}

/// The subset of a function configuration the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    pub function_name: String,
    pub function_arn: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliasConfiguration {
    pub alias_arn: String,
    pub name: String,
    pub function_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetFunctionOutput {
    configuration: FunctionConfiguration,
}

/// Remote function operations the Lambda integration needs.
#[async_trait]
pub trait FunctionProvider: Send + Sync {
    /// `None` when the function does not exist.
    async fn get_function(
        &self,
        region: &str,
        name: &str,
    ) -> Result<Option<FunctionConfiguration>, ProviderError>;

    /// Create and publish a first version.
    async fn create_function(
        &self,
        region: &str,
        name: &str,
        params: &FunctionParams,
        code: &FunctionCode,
    ) -> Result<FunctionConfiguration, ProviderError>;

    /// Replace the code and publish a new version.
    async fn update_function_code(
        &self,
        region: &str,
        name: &str,
        code: &FunctionCode,
    ) -> Result<FunctionConfiguration, ProviderError>;

    async fn update_function_configuration(
        &self,
        region: &str,
        name: &str,
        params: &FunctionParams,
    ) -> Result<FunctionConfiguration, ProviderError>;

    /// `None` when the alias does not exist.
    async fn get_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
    ) -> Result<Option<AliasConfiguration>, ProviderError>;

    async fn create_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, ProviderError>;

    async fn update_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, ProviderError>;
}

/// [`FunctionProvider`] backed by the Lambda REST API.
#[derive(Debug, Clone)]
pub struct AwsFunctions {
    client: AwsClient,
}

impl AwsFunctions {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        region: &str,
        method: Method,
        path: String,
        body: Option<Value>,
    ) -> Result<T, ProviderError> {
        let request = AwsRequest {
            operation,
            service: SERVICE,
            region,
            host: format!("lambda.{region}.amazonaws.com"),
            method,
            path,
            query: Vec::new(),
            body,
        };
        let value = self.client.send(request).await?;
        serde_json::from_value(value).map_err(|e| ProviderError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}

fn absent_if_not_found<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl FunctionProvider for AwsFunctions {
    async fn get_function(
        &self,
        region: &str,
        name: &str,
    ) -> Result<Option<FunctionConfiguration>, ProviderError> {
        let output: Option<GetFunctionOutput> = absent_if_not_found(
            self.call(
                "GetFunction",
                region,
                Method::GET,
                format!("{API_PREFIX}/{name}"),
                None,
            )
            .await,
        )?;
        Ok(output.map(|o| o.configuration))
    }

    async fn create_function(
        &self,
        region: &str,
        name: &str,
        params: &FunctionParams,
        code: &FunctionCode,
    ) -> Result<FunctionConfiguration, ProviderError> {
        let mut body = serde_json::to_value(params).map_err(|e| ProviderError::Decode {
            operation: "CreateFunction".into(),
            message: e.to_string(),
        })?;
        if let Value::Object(map) = &mut body {
            map.insert("FunctionName".into(), json!(name));
            map.insert("Code".into(), json!({ "ZipFile": code.encoded() }));
            map.insert("Publish".into(), json!(true));
        }
        self.call(
            "CreateFunction",
            region,
            Method::POST,
            API_PREFIX.to_string(),
            Some(body),
        )
        .await
    }

    async fn update_function_code(
        &self,
        region: &str,
        name: &str,
        code: &FunctionCode,
    ) -> Result<FunctionConfiguration, ProviderError> {
        self.call(
            "UpdateFunctionCode",
            region,
            Method::PUT,
            format!("{API_PREFIX}/{name}/code"),
            Some(json!({ "ZipFile": code.encoded(), "Publish": true })),
        )
        .await
    }

    async fn update_function_configuration(
        &self,
        region: &str,
        name: &str,
        params: &FunctionParams,
    ) -> Result<FunctionConfiguration, ProviderError> {
        let mut body = serde_json::to_value(params).map_err(|e| ProviderError::Decode {
            operation: "UpdateFunctionConfiguration".into(),
            message: e.to_string(),
        })?;
        // An omitted Environment leaves remote variables in place.
        if let Value::Object(map) = &mut body {
            map.entry("Environment")
                .or_insert_with(|| json!({ "Variables": {} }));
        }
        self.call(
            "UpdateFunctionConfiguration",
            region,
            Method::PUT,
            format!("{API_PREFIX}/{name}/configuration"),
            Some(body),
        )
        .await
    }

    async fn get_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
    ) -> Result<Option<AliasConfiguration>, ProviderError> {
        absent_if_not_found(
            self.call(
                "GetAlias",
                region,
                Method::GET,
                format!("{API_PREFIX}/{name}/aliases/{alias}"),
                None,
            )
            .await,
        )
    }

    async fn create_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, ProviderError> {
        self.call(
            "CreateAlias",
            region,
            Method::POST,
            format!("{API_PREFIX}/{name}/aliases"),
            Some(json!({ "Name": alias, "FunctionVersion": version })),
        )
        .await
    }

    async fn update_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, ProviderError> {
        self.call(
            "UpdateAlias",
            region,
            Method::PUT,
            format!("{API_PREFIX}/{name}/aliases/{alias}"),
            Some(json!({ "FunctionVersion": version })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_sigv4::Credentials;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn functions(server: &MockServer) -> AwsFunctions {
        let client = AwsClient::new(Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        })
        .expect("client")
        .with_endpoint(server.uri());
        AwsFunctions::new(client)
    }

    fn params() -> FunctionParams {
        FunctionParams {
            runtime: "nodejs20.x".into(),
            handler: "index.handler".into(),
            role: "arn:aws:iam::123456789012:role/exec".into(),
            timeout: Some(10),
            memory_size: None,
            description: None,
            environment: BTreeMap::from([("TABLE".to_string(), "users".to_string())]),
        }
    }

    fn configuration(version: &str) -> Value {
        json!({
            "FunctionName": "DEV-users",
            "FunctionArn": "arn:aws:lambda:eu-west-1:123456789012:function:DEV-users",
            "Version": version,
            "Runtime": "nodejs20.x"
        })
    }

    #[test]
    fn params_serialize_in_lambda_shape() {
        let value = serde_json::to_value(params()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "Runtime": "nodejs20.x",
                "Handler": "index.handler",
                "Role": "arn:aws:iam::123456789012:role/exec",
                "Timeout": 10,
                "Environment": {"Variables": {"TABLE": "users"}}
            })
        );
    }

    #[tokio::test]
    async fn missing_function_and_alias_are_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "Type": "User",
                "Message": "Function not found"
            })).insert_header("x-amzn-ErrorType", "ResourceNotFoundException"))
            .mount(&server)
            .await;

        let lambda = functions(&server);
        assert!(lambda.get_function("eu-west-1", "DEV-users").await.expect("get").is_none());
        assert!(lambda
            .get_alias("eu-west-1", "DEV-users", "v0")
            .await
            .expect("alias")
            .is_none());
    }

    #[tokio::test]
    async fn create_publishes_inline_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2015-03-31/functions"))
            .and(body_partial_json(json!({
                "FunctionName": "DEV-users",
                "Publish": true,
                "Code": {"ZipFile": "UEsDBA=="}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(configuration("1")))
            .mount(&server)
            .await;

        let lambda = functions(&server);
        let created = lambda
            .create_function(
                "eu-west-1",
                "DEV-users",
                &params(),
                &FunctionCode {
                    zip: b"PK\x03\x04".to_vec(),
                },
            )
            .await
            .expect("create");
        assert_eq!(created.version, "1");
    }

    #[tokio::test]
    async fn alias_lifecycle() {
        let server = MockServer::start().await;
        let alias = json!({
            "AliasArn": "arn:aws:lambda:eu-west-1:123456789012:function:DEV-users:v0",
            "Name": "v0",
            "FunctionVersion": "4"
        });
        Mock::given(method("GET"))
            .and(path("/2015-03-31/functions/DEV-users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Configuration": configuration("$LATEST")
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/2015-03-31/functions/DEV-users/aliases/v0"))
            .and(body_partial_json(json!({"FunctionVersion": "4"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&alias))
            .mount(&server)
            .await;

        let lambda = functions(&server);
        let existing = lambda
            .get_function("eu-west-1", "DEV-users")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(existing.function_name, "DEV-users");

        let updated = lambda
            .update_alias("eu-west-1", "DEV-users", "v0", "4")
            .await
            .expect("alias");
        assert_eq!(updated.function_version, "4");
        assert!(updated.alias_arn.ends_with(":v0"));
    }

    #[tokio::test]
    async fn configuration_update_clears_removed_environment() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/2015-03-31/functions/DEV-users/configuration"))
            .and(body_json(json!({
                "Runtime": "nodejs20.x",
                "Handler": "index.handler",
                "Role": "arn:aws:iam::123456789012:role/exec",
                "Timeout": 10,
                "Environment": {"Variables": {}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(configuration("$LATEST")))
            .expect(1)
            .mount(&server)
            .await;

        let without_env = FunctionParams {
            environment: BTreeMap::new(),
            ..params()
        };
        let updated = functions(&server)
            .update_function_configuration("eu-west-1", "DEV-users", &without_env)
            .await
            .expect("update");
        assert_eq!(updated.function_name, "DEV-users");
    }
}
