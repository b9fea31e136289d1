//! Deploying and publishing APIs.

use std::fmt;
use std::time::{Duration, Instant};

use gantry_spec::{Api, ApiState, RemoteApi, SpecView};
use serde::Serialize;
use serde_json::Value;

use crate::aws::{ApiGatewayProvider, ProviderError};
use crate::context::DeployContext;
use crate::error::DeployError;

/// What a deploy did to the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "Create",
            Operation::Update => "Update",
        })
    }
}

/// Outcome of [`deploy_api`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReceipt {
    pub identifier: String,
    pub operation: Operation,
    pub duration: Duration,
    pub remote: RemoteApi,
}

/// Outcome of [`publish_api`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub deployment_id: String,
    pub stage: String,
    pub url: String,
}

/// One row of the deployment report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReport {
    pub identifier: String,
    pub remote_name: String,
    pub operation: Option<Operation>,
    pub stage: Option<String>,
    pub remote_id: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "durationMs", serialize_with = "crate::report::serialize_millis")]
    pub duration: Duration,
    pub published: bool,
    pub failure: Option<String>,
}

impl ApiReport {
    pub(crate) fn deployed(receipt: &DeployReceipt, ctx: &DeployContext) -> Self {
        Self {
            identifier: receipt.identifier.clone(),
            remote_name: ctx.remote_name(&receipt.identifier),
            operation: Some(receipt.operation),
            stage: Some(ctx.stage.clone()),
            remote_id: Some(receipt.remote.id.clone()),
            url: None,
            duration: receipt.duration,
            published: false,
            failure: None,
        }
    }

    pub(crate) fn failed(identifier: &str, ctx: &DeployContext, failure: String) -> Self {
        Self {
            identifier: identifier.to_string(),
            remote_name: ctx.remote_name(identifier),
            operation: None,
            stage: None,
            remote_id: None,
            url: None,
            duration: Duration::ZERO,
            published: false,
            failure: Some(failure),
        }
    }

    pub(crate) fn record_publish(&mut self, receipt: PublishReceipt) {
        self.url = Some(receipt.url);
        self.published = true;
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// The document imported for `api`: the provider view, titled with the
/// remote name so that later lookups by name find it.
pub fn remote_document(api: &Api, remote_name: &str) -> Value {
    let mut spec = api.gen_spec(SpecView::Aws);
    if let Some(info) = spec.get_mut("info").and_then(Value::as_object_mut) {
        info.insert("title".into(), Value::String(remote_name.to_string()));
    }
    spec
}

/// Create or overwrite the remote REST API for `api`.
///
/// The remote API is looked up by name; absent, it is created, present, it
/// is overwritten. On failure `api` is marked failed.
pub async fn deploy_api(
    api: &mut Api,
    provider: &dyn ApiGatewayProvider,
    ctx: &DeployContext,
) -> Result<DeployReceipt, ProviderError> {
    let started = Instant::now();
    let remote_name = ctx.remote_name(api.identifier());
    let spec = remote_document(api, &remote_name);

    let result: Result<(RemoteApi, Operation), ProviderError> = async {
        let existing = match provider.find_rest_api(&ctx.region, &remote_name).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        match existing {
            None => Ok((provider.create_rest_api(&ctx.region, &spec).await?, Operation::Create)),
            Some(remote) => Ok((
                provider
                    .update_rest_api(&ctx.region, &remote.id, &spec)
                    .await?,
                Operation::Update,
            )),
        }
    }
    .await;

    match result {
        Ok((remote, operation)) => {
            api.mark_deployed(remote.clone(), operation == Operation::Create);
            let receipt = DeployReceipt {
                identifier: api.identifier().to_string(),
                operation,
                duration: started.elapsed(),
                remote,
            };
            crate::log_api_deployed!(
                api = %receipt.identifier,
                remote_id = %receipt.remote.id,
                operation = %receipt.operation,
                duration_ms = receipt.duration.as_millis() as u64,
                "API deployed"
            );
            Ok(receipt)
        }
        Err(e) => {
            api.mark_failed();
            crate::log_api_deploy_failed!(api = %api.identifier(), error = %e, "API deploy failed");
            Err(e)
        }
    }
}

/// Publish a deployed API to the context's stage.
pub async fn publish_api(
    api: &mut Api,
    provider: &dyn ApiGatewayProvider,
    ctx: &DeployContext,
) -> Result<PublishReceipt, DeployError> {
    let remote = match (api.state(), api.remote()) {
        (ApiState::Created | ApiState::Updated, Some(remote)) => remote.clone(),
        _ => return Err(DeployError::NotDeployed(api.identifier().to_string())),
    };

    let description = format!("{} ({}) deployed to {}", api.title(), remote.name, ctx.stage);
    let deployment = provider
        .create_deployment(&ctx.region, &remote.id, &ctx.stage, &description)
        .await?;
    api.mark_published();

    let receipt = PublishReceipt {
        deployment_id: deployment.id,
        stage: ctx.stage.clone(),
        url: ctx.invoke_url(&remote.id),
    };
    crate::log_api_published!(
        api = %api.identifier(),
        stage = %receipt.stage,
        url = %receipt.url,
        "API published"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::RemoteDeployment;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        existing: Option<RemoteApi>,
        calls: Mutex<Vec<String>>,
        imported: Mutex<Option<Value>>,
        description: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ApiGatewayProvider for Recorder {
        async fn find_rest_api(
            &self,
            _: &str,
            name: &str,
        ) -> Result<Option<RemoteApi>, ProviderError> {
            self.calls.lock().push(format!("find {name}"));
            Ok(self.existing.clone())
        }

        async fn create_rest_api(&self, _: &str, spec: &Value) -> Result<RemoteApi, ProviderError> {
            self.calls.lock().push("create".into());
            *self.imported.lock() = Some(spec.clone());
            Ok(RemoteApi {
                id: "new1".into(),
                name: spec["info"]["title"].as_str().unwrap_or_default().into(),
            })
        }

        async fn update_rest_api(
            &self,
            _: &str,
            id: &str,
            spec: &Value,
        ) -> Result<RemoteApi, ProviderError> {
            self.calls.lock().push(format!("update {id}"));
            *self.imported.lock() = Some(spec.clone());
            Ok(RemoteApi {
                id: id.into(),
                name: "DEV-public".into(),
            })
        }

        async fn create_deployment(
            &self,
            _: &str,
            id: &str,
            stage: &str,
            description: &str,
        ) -> Result<RemoteDeployment, ProviderError> {
            self.calls.lock().push(format!("deploy {id} {stage}"));
            *self.description.lock() = Some(description.to_string());
            Ok(RemoteDeployment {
                id: "dep1".into(),
                description: None,
            })
        }
    }

    fn ctx() -> DeployContext {
        DeployContext::new("eu-west-1", "v0", "DEV")
    }

    #[tokio::test]
    async fn absent_api_is_created() {
        let provider = Recorder::default();
        let mut api = Api::new(json!({"title": "Public"}), "public");

        let receipt = deploy_api(&mut api, &provider, &ctx()).await.expect("deploy");
        assert_eq!(receipt.operation, Operation::Create);
        assert_eq!(receipt.remote.id, "new1");
        assert_eq!(api.state(), ApiState::Created);
        assert_eq!(*provider.calls.lock(), ["find DEV-public", "create"]);
        let imported = provider.imported.lock().clone().expect("imported");
        assert_eq!(imported["info"]["title"], "DEV-public");
    }

    #[tokio::test]
    async fn existing_api_is_overwritten() {
        let provider = Recorder {
            existing: Some(RemoteApi {
                id: "old1".into(),
                name: "DEV-public".into(),
            }),
            ..Default::default()
        };
        let mut api = Api::new(json!({}), "public");

        let receipt = deploy_api(&mut api, &provider, &ctx()).await.expect("deploy");
        assert_eq!(receipt.operation, Operation::Update);
        assert_eq!(api.state(), ApiState::Updated);
        assert_eq!(*provider.calls.lock(), ["find DEV-public", "update old1"]);
    }

    #[tokio::test]
    async fn publish_requires_a_deployed_api() {
        let provider = Recorder::default();
        let mut api = Api::new(json!({}), "public");

        let err = publish_api(&mut api, &provider, &ctx()).await.unwrap_err();
        assert!(matches!(err, DeployError::NotDeployed(id) if id == "public"));
        assert!(provider.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn publish_snapshots_to_the_stage() {
        let provider = Recorder::default();
        let mut api = Api::new(json!({"info": {"title": "Public API"}}), "public");
        deploy_api(&mut api, &provider, &ctx()).await.expect("deploy");

        let receipt = publish_api(&mut api, &provider, &ctx()).await.expect("publish");
        assert_eq!(api.state(), ApiState::Published);
        assert_eq!(receipt.url, "https://new1.execute-api.eu-west-1.amazonaws.com/v0");
        assert_eq!(provider.calls.lock().last().map(String::as_str), Some("deploy new1 v0"));
        assert_eq!(
            provider.description.lock().as_deref(),
            Some("Public API (DEV-public) deployed to v0")
        );
    }

    #[test]
    fn report_serializes_duration_in_millis() {
        let receipt = DeployReceipt {
            identifier: "public".into(),
            operation: Operation::Update,
            duration: Duration::from_millis(1500),
            remote: RemoteApi {
                id: "abc".into(),
                name: "DEV-public".into(),
            },
        };
        let report = ApiReport::deployed(&receipt, &ctx());
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["durationMs"], 1500);
        assert_eq!(value["operation"], "Update");
        assert_eq!(value["remoteId"], "abc");
        assert_eq!(value["remoteName"], "DEV-public");
        assert_eq!(value["stage"], "v0");
    }
}
