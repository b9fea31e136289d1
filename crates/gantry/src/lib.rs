//! Deploys directory-described APIs to AWS API Gateway.
//!
//! Loads endpoint and API specifications, deploys the Lambda functions the
//! endpoints route to, writes their integration data into the endpoints and
//! imports one REST API per API specification, publishing them to a stage.

pub mod api;
pub mod aws;
pub mod context;
pub mod error;
pub mod hooks;
pub mod injector;
pub mod lambda;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod plugins;
pub mod report;

pub use api::{deploy_api, publish_api, ApiReport, Operation};
pub use context::DeployContext;
pub use error::{DeployError, IntegrationError};
pub use hooks::{AttachStage, HookBus, HookError, HookEvent, HookRegistry, IntegrationStage, Plugin};
pub use injector::{apply_injectors, IntegrationDataInjector, LambdaIntegrationInjector};
pub use lambda::{
    IntegrationBatch, IntegrationLoader, IntegrationRequest, LambdaIntegrationLoader, LambdaReport,
    LambdaSelection, LambdaServices,
};
pub use manifest::{ProjectLayout, ProjectManifest};
pub use orchestrator::{DeployOptions, DeployOutcome, Orchestrator, Project};
