//! IAM role lookups.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;

use super::client::{AwsClient, AwsRequest};
use super::ProviderError;

const IAM_VERSION: &str = "2010-05-08";
/// IAM is global; requests are signed for us-east-1.
const IAM_REGION: &str = "us-east-1";

/// Turns a role reference (name or ARN) into an ARN.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, ProviderError>;
}

/// [`RoleResolver`] backed by IAM `GetRole`. Answers are cached for the
/// lifetime of the resolver.
#[derive(Debug)]
pub struct IamRoleResolver {
    client: AwsClient,
    cache: Mutex<HashMap<String, String>>,
}

impl IamRoleResolver {
    pub fn new(client: AwsClient) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RoleResolver for IamRoleResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ProviderError> {
        if reference.starts_with("arn:") {
            return Ok(reference.to_string());
        }
        let cached = self.cache.lock().get(reference).cloned();
        if let Some(arn) = cached {
            return Ok(arn);
        }

        let request = AwsRequest {
            operation: "GetRole",
            service: "iam",
            region: IAM_REGION,
            host: "iam.amazonaws.com".to_string(),
            method: Method::GET,
            path: "/".to_string(),
            query: vec![
                ("Action", "GetRole".to_string()),
                ("RoleName", reference.to_string()),
                ("Version", IAM_VERSION.to_string()),
            ],
            body: None,
        };
        let response = self.client.send(request).await?;
        let arn = response
            .pointer("/GetRoleResponse/GetRoleResult/Role/Arn")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Decode {
                operation: "GetRole".into(),
                message: format!("no ARN in response for role '{reference}'"),
            })?
            .to_string();

        self.cache.lock().insert(reference.to_string(), arn.clone());
        Ok(arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_sigv4::Credentials;
    use serde_json::json;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer) -> IamRoleResolver {
        let client = AwsClient::new(Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        })
        .expect("client")
        .with_endpoint(server.uri());
        IamRoleResolver::new(client)
    }

    #[tokio::test]
    async fn arns_pass_through_without_a_call() {
        let server = MockServer::start().await;
        let roles = resolver(&server);
        let arn = "arn:aws:iam::123456789012:role/exec";
        assert_eq!(roles.resolve(arn).await.expect("resolve"), arn);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn names_are_looked_up_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Action", "GetRole"))
            .and(query_param("RoleName", "exec"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "GetRoleResponse": {"GetRoleResult": {"Role": {
                    "RoleName": "exec",
                    "Arn": "arn:aws:iam::123456789012:role/exec"
                }}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let roles = resolver(&server);
        for _ in 0..2 {
            assert_eq!(
                roles.resolve("exec").await.expect("resolve"),
                "arn:aws:iam::123456789012:role/exec"
            );
        }
    }

    #[tokio::test]
    async fn unknown_role_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "Error": {"Code": "NoSuchEntity", "Message": "The role with name ghost cannot be found."}
            })))
            .mount(&server)
            .await;

        let err = resolver(&server).resolve("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
