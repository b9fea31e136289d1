//! Lambda functions as integrations.
//!
//! ```text
//! lambdas/<identifier>/config.json   # or config.yaml / config.yml
//! lambdas/<identifier>/package.zip
//! ```
//!
//! Every selected lambda is deployed (or updated) and aliased to the stage,
//! then turned into a [`LambdaIntegrationInjector`] that wires endpoints
//! naming it in `x-gantry.lambda` to the alias.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::aws::{FunctionCode, FunctionParams, FunctionProvider, ProviderError, RoleResolver};
use crate::context::DeployContext;
use crate::error::IntegrationError;
use crate::injector::{IntegrationDataInjector, LambdaIntegrationInjector};

const CONFIG_NAMES: &[&str] = &["config.json", "config.yaml", "config.yml"];
const DEFAULT_ARCHIVE: &str = "package.zip";
const CONFLICT_RETRIES: u32 = 5;

/// `config.json` of a lambda.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LambdaConfig {
    #[serde(default)]
    pub params: LambdaParams,
    /// Deployment package, relative to the lambda directory.
    #[serde(default = "default_archive")]
    pub archive: String,
}

fn default_archive() -> String {
    DEFAULT_ARCHIVE.to_string()
}

/// Function parameters as written by the user. `Role` may be a name or an ARN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LambdaParams {
    pub runtime: Option<String>,
    pub handler: Option<String>,
    pub role: Option<String>,
    pub timeout: Option<u32>,
    pub memory_size: Option<u32>,
    pub description: Option<String>,
    pub environment: Option<LambdaEnvironment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LambdaEnvironment {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// A lambda found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lambda {
    pub identifier: String,
    pub directory: PathBuf,
    pub config: LambdaConfig,
}

impl Lambda {
    fn required(&self, field: &'static str, value: &Option<String>) -> Result<String, IntegrationError> {
        value.clone().ok_or_else(|| IntegrationError::MissingParameter {
            lambda: self.identifier.clone(),
            field,
        })
    }
}

/// Load every lambda under `root`, sorted by identifier. A missing root
/// holds no lambdas; a directory without a config file is skipped.
pub async fn load_lambdas(root: &Path) -> Result<Vec<Lambda>, IntegrationError> {
    let io_err = |path: &Path, source| IntegrationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(root, e)),
    };

    let mut lambdas = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(root, e))? {
        let directory = entry.path();
        if !entry.file_type().await.map_err(|e| io_err(&directory, e))?.is_dir() {
            continue;
        }
        let Some(identifier) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if identifier.starts_with('.') {
            continue;
        }
        match read_config(&directory).await? {
            Some(config) => lambdas.push(Lambda {
                identifier,
                directory,
                config,
            }),
            None => tracing::debug!(lambda = %identifier, "skipping lambda directory without config"),
        }
    }
    lambdas.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(lambdas)
}

async fn read_config(directory: &Path) -> Result<Option<LambdaConfig>, IntegrationError> {
    for name in CONFIG_NAMES {
        let path = directory.join(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => return Err(IntegrationError::Io { path, source }),
        };
        return serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|e| IntegrationError::InvalidConfig {
                path,
                message: e.to_string(),
            });
    }
    Ok(None)
}

/// Produces the deployment package of a lambda.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn archive(&self, lambda: &Lambda) -> Result<Vec<u8>, IntegrationError>;
}

/// Reads an already-built zip from the lambda directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrebuiltArchive;

#[async_trait]
impl ArchiveSource for PrebuiltArchive {
    async fn archive(&self, lambda: &Lambda) -> Result<Vec<u8>, IntegrationError> {
        let path = lambda.directory.join(&lambda.config.archive);
        tokio::fs::read(&path)
            .await
            .map_err(|source| IntegrationError::Io { path, source })
    }
}

/// What deploying a lambda did to the remote function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LambdaOperation {
    Create,
    Update,
}

impl fmt::Display for LambdaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LambdaOperation::Create => "Create",
            LambdaOperation::Update => "Update",
        })
    }
}

/// One row of the lambda deployment report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaReport {
    pub identifier: String,
    pub remote_name: String,
    pub operation: LambdaOperation,
    #[serde(rename = "durationMs", serialize_with = "crate::report::serialize_millis")]
    pub duration: Duration,
    pub version: String,
    pub alias: String,
    pub alias_existed: bool,
    pub alias_arn: String,
}

/// Collaborators a lambda deploy talks to.
#[derive(Clone)]
pub struct LambdaServices {
    pub functions: Arc<dyn FunctionProvider>,
    pub roles: Arc<dyn RoleResolver>,
    pub archives: Arc<dyn ArchiveSource>,
    /// Base delay between retries of a conflicting update.
    pub retry_delay: Duration,
}

impl LambdaServices {
    pub fn new(
        functions: Arc<dyn FunctionProvider>,
        roles: Arc<dyn RoleResolver>,
        archives: Arc<dyn ArchiveSource>,
    ) -> Self {
        Self {
            functions,
            roles,
            archives,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Deploy one lambda and point `alias` at the new version.
pub async fn deploy_lambda(
    lambda: &Lambda,
    services: &LambdaServices,
    ctx: &DeployContext,
    alias: &str,
) -> Result<LambdaReport, IntegrationError> {
    let started = Instant::now();
    let remote_name = ctx.remote_name(&lambda.identifier);
    let provider_err = |source| IntegrationError::Provider {
        lambda: lambda.identifier.clone(),
        source,
    };

    let params = &lambda.config.params;
    let role_reference = lambda.required("Role", &params.role)?;
    let function_params = FunctionParams {
        runtime: lambda.required("Runtime", &params.runtime)?,
        handler: lambda.required("Handler", &params.handler)?,
        role: services
            .roles
            .resolve(&role_reference)
            .await
            .map_err(provider_err)?,
        timeout: params.timeout,
        memory_size: params.memory_size,
        description: params.description.clone(),
        environment: params
            .environment
            .as_ref()
            .map(|env| env.variables.clone())
            .unwrap_or_default(),
    };
    let code = FunctionCode {
        zip: services.archives.archive(lambda).await?,
    };

    let functions = services.functions.as_ref();
    let region = ctx.region.as_str();
    let existing = functions
        .get_function(region, &remote_name)
        .await
        .map_err(provider_err)?;

    let (operation, published) = match existing {
        None => {
            let created = functions
                .create_function(region, &remote_name, &function_params, &code)
                .await
                .map_err(provider_err)?;
            (LambdaOperation::Create, created)
        }
        Some(_) => {
            // Configuration first, so the version published with the code
            // carries it.
            retry_on_conflict(services.retry_delay, || {
                functions.update_function_configuration(region, &remote_name, &function_params)
            })
            .await
            .map_err(provider_err)?;
            let updated = retry_on_conflict(services.retry_delay, || {
                functions.update_function_code(region, &remote_name, &code)
            })
            .await
            .map_err(provider_err)?;
            (LambdaOperation::Update, updated)
        }
    };

    let current = functions
        .get_alias(region, &remote_name, alias)
        .await
        .map_err(provider_err)?;
    let alias_existed = current.is_some();
    let aliased = if alias_existed {
        functions
            .update_alias(region, &remote_name, alias, &published.version)
            .await
    } else {
        functions
            .create_alias(region, &remote_name, alias, &published.version)
            .await
    };
    let aliased = aliased.map_err(provider_err)?;

    let report = LambdaReport {
        identifier: lambda.identifier.clone(),
        remote_name,
        operation,
        duration: started.elapsed(),
        version: published.version,
        alias: alias.to_string(),
        alias_existed,
        alias_arn: aliased.alias_arn,
    };
    crate::log_lambda_deployed!(
        lambda = %report.identifier,
        operation = %report.operation,
        version = %report.version,
        alias = %report.alias,
        duration_ms = report.duration.as_millis() as u64,
        "lambda deployed"
    );
    Ok(report)
}

async fn retry_on_conflict<T, F, Fut>(base_delay: Duration, mut call: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                attempt += 1;
                tracing::debug!(attempt, error = %e, "function busy, retrying");
                tokio::time::sleep(base_delay * attempt).await;
            }
            result => return result,
        }
    }
}

/// What an integration loader hands to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct IntegrationBatch {
    pub injectors: Vec<Arc<dyn IntegrationDataInjector>>,
    pub lambdas: Vec<LambdaReport>,
}

/// Endpoint integration targets the run needs, by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationRequest {
    pub targets: BTreeSet<String>,
}

/// Deploys integration targets and returns injectors for them.
#[async_trait]
pub trait IntegrationLoader: Send + Sync {
    fn name(&self) -> &str;

    async fn load_integrations(
        &self,
        ctx: &DeployContext,
        request: &IntegrationRequest,
    ) -> Result<IntegrationBatch, IntegrationError>;
}

/// Which local lambdas a run deploys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LambdaSelection {
    /// Those referenced by an endpoint of a deployed API.
    #[default]
    Referenced,
    /// Every lambda on disk.
    All,
    /// Exactly these identifiers.
    Only(Vec<String>),
}

/// The built-in [`IntegrationLoader`] for Lambda functions.
pub struct LambdaIntegrationLoader {
    root: PathBuf,
    services: LambdaServices,
    selection: LambdaSelection,
    alias: Option<String>,
    invocation_role: Option<String>,
}

impl LambdaIntegrationLoader {
    pub fn new(root: impl Into<PathBuf>, services: LambdaServices) -> Self {
        Self {
            root: root.into(),
            services,
            selection: LambdaSelection::default(),
            alias: None,
            invocation_role: None,
        }
    }

    pub fn with_selection(mut self, selection: LambdaSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Alias name; the stage when unset.
    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    /// Role API Gateway assumes to invoke the functions (name or ARN).
    pub fn with_invocation_role(mut self, role: Option<String>) -> Self {
        self.invocation_role = role;
        self
    }

    fn select(
        &self,
        lambdas: Vec<Lambda>,
        request: &IntegrationRequest,
    ) -> Result<Vec<Lambda>, IntegrationError> {
        match &self.selection {
            LambdaSelection::All => Ok(lambdas),
            LambdaSelection::Referenced => Ok(lambdas
                .into_iter()
                .filter(|l| request.targets.contains(&l.identifier))
                .collect()),
            LambdaSelection::Only(wanted) => {
                let known: BTreeSet<&str> = lambdas.iter().map(|l| l.identifier.as_str()).collect();
                if let Some(missing) = wanted.iter().find(|w| !known.contains(w.as_str())) {
                    return Err(IntegrationError::Loader {
                        loader: self.name().to_string(),
                        message: format!("no lambda named '{missing}' under {}", self.root.display()),
                    });
                }
                Ok(lambdas
                    .into_iter()
                    .filter(|l| wanted.contains(&l.identifier))
                    .collect())
            }
        }
    }
}

#[async_trait]
impl IntegrationLoader for LambdaIntegrationLoader {
    fn name(&self) -> &str {
        "lambda"
    }

    async fn load_integrations(
        &self,
        ctx: &DeployContext,
        request: &IntegrationRequest,
    ) -> Result<IntegrationBatch, IntegrationError> {
        let lambdas = self.select(load_lambdas(&self.root).await?, request)?;
        for target in &request.targets {
            if !lambdas.iter().any(|l| &l.identifier == target) {
                tracing::warn!(lambda = %target, "endpoints reference a lambda that is not deployed by this run");
            }
        }
        if lambdas.is_empty() {
            return Ok(IntegrationBatch::default());
        }

        let invocation_role = match &self.invocation_role {
            Some(reference) => Some(self.services.roles.resolve(reference).await.map_err(|source| {
                IntegrationError::Provider {
                    lambda: "*".to_string(),
                    source,
                }
            })?),
            None => {
                tracing::warn!(
                    lambdas = lambdas.len(),
                    "no invocation role configured: API Gateway can invoke the functions only if they grant it a resource-based permission"
                );
                None
            }
        };
        let alias = self.alias.clone().unwrap_or_else(|| ctx.stage.clone());

        let results = join_all(
            lambdas
                .iter()
                .map(|lambda| deploy_lambda(lambda, &self.services, ctx, &alias)),
        )
        .await;

        let mut batch = IntegrationBatch::default();
        for result in results {
            let report = result?;
            batch.injectors.push(Arc::new(LambdaIntegrationInjector::new(
                &report.identifier,
                &report.alias_arn,
                &ctx.region,
                invocation_role.clone(),
            )));
            batch.lambdas.push(report);
        }
        Ok(batch)
    }
}
