//! The deployment pipeline.
//!
//! One run loads the specifications, deploys integration targets, writes
//! integration data into the endpoints, attaches endpoints to their APIs and
//! finally deploys and publishes every API. Each step is bracketed by a pair
//! of hook events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use gantry_spec::{load_apis, load_endpoints, Api, Endpoint};
use serde::Serialize;

use crate::api::{deploy_api, publish_api, ApiReport};
use crate::aws::ApiGatewayProvider;
use crate::context::DeployContext;
use crate::error::DeployError;
use crate::hooks::{AttachStage, HookBus, HookEvent, IntegrationStage};
use crate::injector::apply_injectors;
use crate::lambda::{IntegrationLoader, IntegrationRequest, LambdaReport};
use crate::manifest::ProjectLayout;

/// Options of one [`Orchestrator::deploy`] run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// APIs to deploy by identifier; all when empty.
    pub apis: Vec<String>,
    /// Pause before the deploy of API `i`, multiplied by `i`.
    pub deploy_delay: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            apis: Vec::new(),
            deploy_delay: Duration::from_millis(1000),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployOutcome {
    pub lambdas: Vec<LambdaReport>,
    pub apis: Vec<ApiReport>,
}

impl DeployOutcome {
    /// Whether any API failed to deploy or publish.
    pub fn has_failures(&self) -> bool {
        self.apis.iter().any(ApiReport::is_failure)
    }
}

/// A project's specifications, loaded and attached with its hooks.
#[derive(Debug, Clone)]
pub struct Project {
    layout: ProjectLayout,
    hooks: Arc<HookBus>,
}

impl Project {
    pub fn new(layout: ProjectLayout, hooks: Arc<HookBus>) -> Self {
        Self { layout, hooks }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn hooks(&self) -> &HookBus {
        &self.hooks
    }

    /// Load every API and endpoint of the project.
    pub async fn load_specs(&self) -> Result<(Vec<Api>, Vec<Endpoint>), DeployError> {
        self.hooks.fire(HookEvent::BeforeApisLoad, ()).await?;
        let apis = load_apis(&self.layout.apis).await?;
        self.hooks.fire(HookEvent::BeforeEndpointsLoad, ()).await?;
        let endpoints = load_endpoints(&self.layout.endpoints).await?;

        let apis = self.hooks.fire(HookEvent::AfterApisLoad, apis).await?;
        let endpoints = self.hooks.fire(HookEvent::AfterEndpointsLoad, endpoints).await?;
        crate::log_specs_loaded!(
            apis = apis.len(),
            endpoints = endpoints.len(),
            "specifications loaded"
        );
        Ok((apis, endpoints))
    }

    /// Attach every endpoint to the APIs it declares.
    pub async fn attach(
        &self,
        apis: Vec<Api>,
        endpoints: Vec<Arc<Endpoint>>,
    ) -> Result<Vec<Api>, DeployError> {
        let mut stage = self
            .hooks
            .fire(HookEvent::BeforeAddEndpointsToApis, AttachStage { apis, endpoints })
            .await?;
        for api in &mut stage.apis {
            for endpoint in &stage.endpoints {
                api.add_endpoint(Arc::clone(endpoint), false)?;
            }
        }
        let stage = self.hooks.fire(HookEvent::AfterAddEndpointsToApis, stage).await?;
        Ok(stage.apis)
    }

    /// Load and attach without integrations or remote calls.
    pub async fn assemble(&self) -> Result<Vec<Api>, DeployError> {
        let (apis, endpoints) = self.load_specs().await?;
        self.attach(apis, endpoints.into_iter().map(Arc::new).collect())
            .await
    }
}

/// Runs the deployment pipeline against one project.
pub struct Orchestrator {
    project: Project,
    apigateway: Arc<dyn ApiGatewayProvider>,
    loaders: Vec<Arc<dyn IntegrationLoader>>,
}

impl Orchestrator {
    pub fn new(project: Project, apigateway: Arc<dyn ApiGatewayProvider>) -> Self {
        Self {
            project,
            apigateway,
            loaders: Vec::new(),
        }
    }

    /// Add an integration loader. Loaders run concurrently.
    pub fn with_loader(mut self, loader: Arc<dyn IntegrationLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Run the full pipeline.
    ///
    /// Remote failures of single APIs are reported, not returned. Publishing
    /// only happens when every selected API deployed. A permission failure
    /// aborts the run.
    pub async fn deploy(
        &self,
        ctx: &DeployContext,
        options: &DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let started = Instant::now();
        crate::log_run_started!(
            region = %ctx.region,
            stage = %ctx.stage,
            environment = %ctx.environment,
            "deployment started"
        );

        let (apis, endpoints) = self.project.load_specs().await?;
        let apis = select_apis(apis, &options.apis)?;

        let request = IntegrationRequest {
            targets: endpoints
                .iter()
                .filter(|e| apis.iter().any(|a| e.belongs_to_api(a.identifier())))
                .filter_map(|e| e.integration_target())
                .map(String::from)
                .collect(),
        };

        let hooks = self.project.hooks();
        let ctx = hooks
            .fire(HookEvent::BeforeLoadIntegrations, ctx.clone())
            .await?;
        let batches = join_all(
            self.loaders
                .iter()
                .map(|loader| loader.load_integrations(&ctx, &request)),
        )
        .await;
        let mut injectors = Vec::new();
        let mut lambdas = Vec::new();
        for batch in batches {
            let batch = batch?;
            injectors.extend(batch.injectors);
            lambdas.extend(batch.lambdas);
        }
        let injectors = hooks
            .fire(HookEvent::AfterLoadIntegrations, injectors)
            .await?;

        let mut stage = hooks
            .fire(
                HookEvent::BeforeAddIntegrationDataToEndpoints,
                IntegrationStage { injectors, endpoints },
            )
            .await?;
        apply_injectors(&stage.injectors, &mut stage.endpoints)?;
        let stage = hooks
            .fire(HookEvent::AfterAddIntegrationDataToEndpoints, stage)
            .await?;

        let endpoints = stage.endpoints.into_iter().map(Arc::new).collect();
        let apis = self.project.attach(apis, endpoints).await?;

        let mut apis = hooks.fire(HookEvent::BeforePublishAllApis, apis).await?;
        let reports = self
            .deploy_and_publish(&mut apis, &ctx, options.deploy_delay)
            .await?;
        let reports = hooks.fire(HookEvent::AfterPublishAllApis, reports).await?;

        let outcome = DeployOutcome { lambdas, apis: reports };
        crate::log_run_completed!(
            apis = outcome.apis.len(),
            lambdas = outcome.lambdas.len(),
            failed = outcome.apis.iter().filter(|r| r.is_failure()).count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "deployment finished"
        );
        Ok(outcome)
    }

    async fn deploy_and_publish(
        &self,
        apis: &mut [Api],
        ctx: &DeployContext,
        delay: Duration,
    ) -> Result<Vec<ApiReport>, DeployError> {
        let provider = self.apigateway.as_ref();

        let results = join_all(apis.iter_mut().enumerate().map(move |(position, api)| async move {
            let wait = delay.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX));
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            deploy_api(api, provider, ctx).await
        }))
        .await;

        let mut reports = Vec::with_capacity(apis.len());
        for (api, result) in apis.iter().zip(results) {
            match result {
                Ok(receipt) => reports.push(ApiReport::deployed(&receipt, ctx)),
                Err(e) if e.is_access_denied() => return Err(e.into()),
                Err(e) => reports.push(ApiReport::failed(api.identifier(), ctx, e.to_string())),
            }
        }

        let failed = reports.iter().filter(|r| r.is_failure()).count();
        if failed > 0 {
            tracing::warn!(failed, "not publishing: some APIs failed to deploy");
            return Ok(reports);
        }

        let results = join_all(apis.iter_mut().map(|api| publish_api(api, provider, ctx))).await;
        for (report, result) in reports.iter_mut().zip(results) {
            match result {
                Ok(receipt) => report.record_publish(receipt),
                Err(e) if e.is_permission_denied() => return Err(e),
                Err(e) => {
                    tracing::warn!(api = %report.identifier, error = %e, "API publish failed");
                    report.failure = Some(e.to_string());
                }
            }
        }
        Ok(reports)
    }
}

fn select_apis(apis: Vec<Api>, wanted: &[String]) -> Result<Vec<Api>, DeployError> {
    if let Some(unknown) = wanted
        .iter()
        .find(|w| !apis.iter().any(|a| a.identifier() == w.as_str()))
    {
        return Err(DeployError::NoDeployableTarget(format!(
            "no API named '{unknown}'"
        )));
    }
    let selected: Vec<Api> = apis
        .into_iter()
        .filter(|a| wanted.is_empty() || wanted.iter().any(|w| w == a.identifier()))
        .collect();
    if selected.is_empty() {
        return Err(DeployError::NoDeployableTarget(
            "no API specification found".to_string(),
        ));
    }
    Ok(selected)
}
