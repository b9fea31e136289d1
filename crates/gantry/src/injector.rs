//! Integration data injectors.
//!
//! An injector carries the provider wiring of one deployed integration and
//! knows which endpoints it belongs to.

use std::fmt;
use std::sync::Arc;

use gantry_spec::Endpoint;
use serde_json::{json, Map, Value};

use crate::error::IntegrationError;

/// Endpoint spec key holding API Gateway integration settings.
pub const INTEGRATION_KEY: &str = "x-amazon-apigateway-integration";

/// Capability to attach integration data to matching endpoints.
pub trait IntegrationDataInjector: Send + Sync + fmt::Debug {
    /// Name used in logs and conflict errors.
    fn name(&self) -> String;

    fn applies_to(&self, endpoint: &Endpoint) -> bool;

    /// Merge this injector's data into `endpoint`. Applying twice leaves the
    /// endpoint as after one application.
    fn apply_to_endpoint(&self, endpoint: &mut Endpoint);

    /// An exclusive injector refuses to share an endpoint with another
    /// exclusive injector.
    fn is_exclusive(&self) -> bool {
        true
    }
}

/// Apply every injector to every endpoint it claims, in injector order.
///
/// Conflicts are detected for all endpoints before any endpoint is touched.
/// Returns the number of (injector, endpoint) applications.
pub fn apply_injectors(
    injectors: &[Arc<dyn IntegrationDataInjector>],
    endpoints: &mut [Endpoint],
) -> Result<usize, IntegrationError> {
    let mut plan: Vec<Vec<&Arc<dyn IntegrationDataInjector>>> = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints.iter() {
        let claims: Vec<_> = injectors.iter().filter(|i| i.applies_to(endpoint)).collect();
        let mut exclusive = claims.iter().filter(|i| i.is_exclusive());
        if let (Some(first), Some(second)) = (exclusive.next(), exclusive.next()) {
            return Err(IntegrationError::InjectorConflict {
                endpoint: endpoint.to_string(),
                first: first.name(),
                second: second.name(),
            });
        }
        plan.push(claims);
    }

    let mut applied = 0;
    for (endpoint, claims) in endpoints.iter_mut().zip(plan) {
        for injector in claims {
            injector.apply_to_endpoint(endpoint);
            crate::log_integration_applied!(
                injector = %injector.name(),
                endpoint = %endpoint,
                "integration applied"
            );
            applied += 1;
        }
    }
    Ok(applied)
}

/// Routes an endpoint to a Lambda alias through an `aws_proxy` integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaIntegrationInjector {
    identifier: String,
    alias_arn: String,
    region: String,
    invocation_role: Option<String>,
}

impl LambdaIntegrationInjector {
    pub fn new(
        identifier: impl Into<String>,
        alias_arn: impl Into<String>,
        region: impl Into<String>,
        invocation_role: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            alias_arn: alias_arn.into(),
            region: region.into(),
            invocation_role,
        }
    }

    /// API Gateway service URI invoking the alias.
    pub fn invocation_uri(&self) -> String {
        format!(
            "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations",
            self.region, self.alias_arn
        )
    }

    fn integration(&self) -> Value {
        let mut integration = Map::new();
        integration.insert("type".into(), json!("aws_proxy"));
        integration.insert("httpMethod".into(), json!("POST"));
        integration.insert("uri".into(), json!(self.invocation_uri()));
        integration.insert("passthroughBehavior".into(), json!("when_no_match"));
        integration.insert("contentHandling".into(), json!("CONVERT_TO_TEXT"));
        if let Some(role) = &self.invocation_role {
            integration.insert("credentials".into(), json!(role));
        }
        Value::Object(integration)
    }
}

impl IntegrationDataInjector for LambdaIntegrationInjector {
    fn name(&self) -> String {
        format!("lambda:{}", self.identifier)
    }

    fn applies_to(&self, endpoint: &Endpoint) -> bool {
        endpoint.integration_target() == Some(self.identifier.as_str())
    }

    fn apply_to_endpoint(&self, endpoint: &mut Endpoint) {
        endpoint.merge_spec(&json!({ INTEGRATION_KEY: self.integration() }));
    }
}
