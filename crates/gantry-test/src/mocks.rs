//! In-memory providers for pipeline tests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use gantry_lib::aws::{
    AliasConfiguration, ApiGatewayProvider, FunctionCode, FunctionConfiguration, FunctionParams,
    FunctionProvider, ProviderError, RemoteDeployment, RoleResolver,
};
use gantry_spec::RemoteApi;

const ACCOUNT: &str = "123456789012";

#[derive(Debug, Default)]
struct GatewayState {
    apis: Vec<RemoteApi>,
    imports: Vec<(String, Value)>,
    deployments: Vec<(String, String)>,
    calls: Vec<String>,
}

/// API Gateway double. REST API ids are `api<n>` in creation order.
#[derive(Debug, Default)]
pub struct MockApiGateway {
    state: Mutex<GatewayState>,
    rejected: HashSet<String>,
    deny_all: bool,
    missing_lookup: bool,
}

impl MockApiGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject imports of the API with this remote name.
    pub fn rejecting(mut self, remote_name: &str) -> Self {
        self.rejected.insert(remote_name.to_string());
        self
    }

    /// Answer every mutating call with an access-denied error.
    pub fn denying(mut self) -> Self {
        self.deny_all = true;
        self
    }

    /// Answer lookups with a not-found error instead of an empty result.
    pub fn with_missing_lookup(mut self) -> Self {
        self.missing_lookup = true;
        self
    }

    /// Every call made so far, e.g. `create DEV-public`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Documents imported for `remote_name`, oldest first.
    pub fn imports(&self, remote_name: &str) -> Vec<Value> {
        self.state
            .lock()
            .imports
            .iter()
            .filter(|(name, _)| name == remote_name)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    /// `(rest api id, stage)` of every stage deployment.
    pub fn deployments(&self) -> Vec<(String, String)> {
        self.state.lock().deployments.clone()
    }

    fn check(&self, operation: &str, remote_name: &str) -> Result<(), ProviderError> {
        if self.deny_all {
            return Err(ProviderError::AccessDenied {
                operation: operation.to_string(),
                message: format!("User is not authorized to perform: apigateway:{operation}"),
            });
        }
        if self.rejected.contains(remote_name) {
            return Err(ProviderError::Rejected {
                operation: operation.to_string(),
                status: 400,
                code: "BadRequestException".to_string(),
                message: format!("invalid specification for {remote_name}"),
            });
        }
        Ok(())
    }
}

fn title(spec: &Value) -> String {
    spec["info"]["title"].as_str().unwrap_or_default().to_string()
}

#[async_trait]
impl ApiGatewayProvider for MockApiGateway {
    async fn find_rest_api(&self, _: &str, name: &str) -> Result<Option<RemoteApi>, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("find {name}"));
        let found = state.apis.iter().find(|a| a.name == name).cloned();
        match found {
            None if self.missing_lookup => Err(ProviderError::NotFound {
                operation: "GetRestApis".to_string(),
                message: format!("no REST API named {name}"),
            }),
            found => Ok(found),
        }
    }

    async fn create_rest_api(&self, _: &str, spec: &Value) -> Result<RemoteApi, ProviderError> {
        let name = title(spec);
        self.check("ImportRestApi", &name)?;
        let mut state = self.state.lock();
        let remote = RemoteApi {
            id: format!("api{}", state.apis.len()),
            name: name.clone(),
        };
        state.apis.push(remote.clone());
        state.imports.push((name.clone(), spec.clone()));
        state.calls.push(format!("create {name}"));
        Ok(remote)
    }

    async fn update_rest_api(&self, _: &str, id: &str, spec: &Value) -> Result<RemoteApi, ProviderError> {
        let name = title(spec);
        self.check("PutRestApi", &name)?;
        let mut state = self.state.lock();
        let Some(remote) = state.apis.iter().find(|a| a.id == id).cloned() else {
            return Err(ProviderError::NotFound {
                operation: "PutRestApi".to_string(),
                message: format!("Invalid API identifier specified {id}"),
            });
        };
        state.imports.push((name.clone(), spec.clone()));
        state.calls.push(format!("update {name}"));
        Ok(remote)
    }

    async fn create_deployment(
        &self,
        _: &str,
        id: &str,
        stage: &str,
        _: &str,
    ) -> Result<RemoteDeployment, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("publish {id} {stage}"));
        state.deployments.push((id.to_string(), stage.to_string()));
        Ok(RemoteDeployment {
            id: format!("dep{}", state.deployments.len()),
            description: None,
        })
    }
}

#[derive(Debug, Default)]
struct FunctionsState {
    versions: BTreeMap<String, u32>,
    params: BTreeMap<String, FunctionParams>,
    aliases: BTreeMap<(String, String), String>,
    calls: Vec<String>,
}

/// Lambda double. Every code update publishes the next version.
#[derive(Debug, Default)]
pub struct MockFunctions {
    state: Mutex<FunctionsState>,
}

impl MockFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Latest published version of `name`.
    pub fn version(&self, name: &str) -> Option<u32> {
        self.state.lock().versions.get(name).copied()
    }

    /// Configuration last applied to `name`.
    pub fn params(&self, name: &str) -> Option<FunctionParams> {
        self.state.lock().params.get(name).cloned()
    }

    /// Version `alias` of `name` points at.
    pub fn alias(&self, name: &str, alias: &str) -> Option<String> {
        self.state
            .lock()
            .aliases
            .get(&(name.to_string(), alias.to_string()))
            .cloned()
    }

    fn configuration(region: &str, name: &str, version: u32) -> FunctionConfiguration {
        FunctionConfiguration {
            function_name: name.to_string(),
            function_arn: format!("arn:aws:lambda:{region}:{ACCOUNT}:function:{name}"),
            version: version.to_string(),
        }
    }

    fn alias_configuration(region: &str, name: &str, alias: &str, version: &str) -> AliasConfiguration {
        AliasConfiguration {
            alias_arn: format!("arn:aws:lambda:{region}:{ACCOUNT}:function:{name}:{alias}"),
            name: alias.to_string(),
            function_version: version.to_string(),
        }
    }
}

#[async_trait]
impl FunctionProvider for MockFunctions {
    async fn get_function(
        &self,
        region: &str,
        name: &str,
    ) -> Result<Option<FunctionConfiguration>, ProviderError> {
        let state = self.state.lock();
        Ok(state
            .versions
            .get(name)
            .map(|v| Self::configuration(region, name, *v)))
    }

    async fn create_function(
        &self,
        region: &str,
        name: &str,
        params: &FunctionParams,
        _: &FunctionCode,
    ) -> Result<FunctionConfiguration, ProviderError> {
        let mut state = self.state.lock();
        state.versions.insert(name.to_string(), 1);
        state.params.insert(name.to_string(), params.clone());
        state.calls.push(format!("create {name}"));
        Ok(Self::configuration(region, name, 1))
    }

    async fn update_function_code(
        &self,
        region: &str,
        name: &str,
        _: &FunctionCode,
    ) -> Result<FunctionConfiguration, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("code {name}"));
        let version = state.versions.entry(name.to_string()).or_insert(0);
        *version += 1;
        let version = *version;
        Ok(Self::configuration(region, name, version))
    }

    async fn update_function_configuration(
        &self,
        region: &str,
        name: &str,
        params: &FunctionParams,
    ) -> Result<FunctionConfiguration, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("config {name}"));
        state.params.insert(name.to_string(), params.clone());
        let version = state.versions.get(name).copied().unwrap_or_default();
        Ok(Self::configuration(region, name, version))
    }

    async fn get_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
    ) -> Result<Option<AliasConfiguration>, ProviderError> {
        Ok(self
            .alias(name, alias)
            .map(|v| Self::alias_configuration(region, name, alias, &v)))
    }

    async fn create_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("create-alias {name}:{alias}@{version}"));
        state
            .aliases
            .insert((name.to_string(), alias.to_string()), version.to_string());
        Ok(Self::alias_configuration(region, name, alias, version))
    }

    async fn update_alias(
        &self,
        region: &str,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasConfiguration, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("update-alias {name}:{alias}@{version}"));
        state
            .aliases
            .insert((name.to_string(), alias.to_string()), version.to_string());
        Ok(Self::alias_configuration(region, name, alias, version))
    }
}

/// Resolves role names to ARNs of a fixed account without any lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRoles;

#[async_trait]
impl RoleResolver for StaticRoles {
    async fn resolve(&self, reference: &str) -> Result<String, ProviderError> {
        if reference.starts_with("arn:") {
            Ok(reference.to_string())
        } else {
            Ok(format!("arn:aws:iam::{ACCOUNT}:role/{reference}"))
        }
    }
}
