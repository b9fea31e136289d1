//! End-to-end pipeline tests against in-memory providers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use gantry_lib::lambda::PrebuiltArchive;
use gantry_lib::plugins::CorsPlugin;
use gantry_lib::{
    AttachStage, DeployContext, DeployError, DeployOptions, HookBus, HookEvent, HookRegistry,
    LambdaIntegrationLoader, LambdaServices, Operation, Orchestrator,
};
use gantry_spec::{SpecError, SpecView};

use crate::{MockApiGateway, MockFunctions, ProjectFixture, StaticRoles};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ctx() -> DeployContext {
    DeployContext::new("eu-west-1", "v0", "DEV")
}

fn options() -> DeployOptions {
    DeployOptions {
        apis: Vec::new(),
        deploy_delay: Duration::ZERO,
    }
}

fn orchestrator(
    fixture: &ProjectFixture,
    gateway: &Arc<MockApiGateway>,
    functions: &Arc<MockFunctions>,
    hooks: HookBus,
) -> Orchestrator {
    let mut services = LambdaServices::new(
        functions.clone(),
        Arc::new(StaticRoles),
        Arc::new(PrebuiltArchive),
    );
    services.retry_delay = Duration::from_millis(1);
    let loader = LambdaIntegrationLoader::new(fixture.layout().lambdas, services)
        .with_invocation_role(Some("apigw-invoke".to_string()));
    Orchestrator::new(fixture.project(hooks), gateway.clone()).with_loader(Arc::new(loader))
}

/// One `public` API with `GET /users/{id}` backed by the `users` lambda.
fn users_project() -> ProjectFixture {
    let fixture = ProjectFixture::new().expect("fixture");
    fixture
        .api("public", json!({"title": "Public API", "description": "Public surface"}))
        .expect("api");
    fixture
        .endpoint("users", json!({"x-gantry": {"apis": ["public"]}, "tags": ["users"]}))
        .expect("fragment");
    fixture
        .endpoint(
            "users/{id}/GET",
            json!({
                "x-gantry": {"lambda": "users"},
                "summary": "Fetch one user",
                "externalDocs": {"url": "https://docs.example.com/users"},
                "responses": {"200": {"description": "The user"}}
            }),
        )
        .expect("endpoint");
    fixture
        .lambda(
            "users",
            json!({"params": {"Runtime": "nodejs20.x", "Handler": "index.handler", "Role": "lambda-exec"}}),
        )
        .expect("lambda");
    fixture
}

fn integration(doc: &Value, path: &str, method: &str) -> Value {
    doc["paths"][path][method]["x-amazon-apigateway-integration"].clone()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deeper_fragments_override_and_keys_union() {
    let fixture = users_project();
    fixture
        .endpoint("users/{id}", json!({"summary": "User resource"}))
        .expect("fragment");

    let (_, endpoints) = fixture
        .project(HookBus::empty())
        .load_specs()
        .await
        .expect("load");
    assert_eq!(endpoints.len(), 1);
    let doc = endpoints[0].document();
    assert_eq!(doc["summary"], "Fetch one user");
    assert_eq!(doc["tags"], json!(["users"]));
    assert_eq!(doc["x-gantry"], json!({"apis": ["public"], "lambda": "users"}));
}

#[tokio::test]
async fn endpoint_without_any_fragment_is_empty() {
    let fixture = ProjectFixture::new().expect("fixture");
    std::fs::create_dir_all(fixture.root().join("endpoints/health/GET")).expect("mkdir");

    let (apis, endpoints) = fixture
        .project(HookBus::empty())
        .load_specs()
        .await
        .expect("load");
    assert!(apis.is_empty());
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].path(), "/health");
    assert_eq!(*endpoints[0].document(), json!({}));
}

#[tokio::test]
async fn duplicate_endpoint_aborts_before_any_remote_call() {
    let fixture = users_project();
    fixture
        .endpoint("users/{id}/get", json!({"summary": "again"}))
        .expect("endpoint");
    let gateway = Arc::new(MockApiGateway::new());
    let functions = Arc::new(MockFunctions::new());

    let err = orchestrator(&fixture, &gateway, &functions, HookBus::empty())
        .deploy(&ctx(), &options())
        .await
        .unwrap_err();
    assert!(
        matches!(err, DeployError::Spec(SpecError::DuplicateEndpoint { .. })),
        "got {err:?}"
    );
    assert!(gateway.calls().is_empty());
    assert!(functions.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_deploy_creates_lambda_api_and_stage() {
    let fixture = users_project();
    let gateway = Arc::new(MockApiGateway::new());
    let functions = Arc::new(MockFunctions::new());

    let outcome = orchestrator(&fixture, &gateway, &functions, HookBus::empty())
        .deploy(&ctx(), &options())
        .await
        .expect("deploy");

    assert!(!outcome.has_failures());
    assert_eq!(outcome.lambdas.len(), 1);
    assert_eq!(outcome.lambdas[0].remote_name, "DEV-users");
    assert_eq!(functions.alias("DEV-users", "v0").as_deref(), Some("1"));
    assert_eq!(
        functions.params("DEV-users").map(|p| p.role),
        Some("arn:aws:iam::123456789012:role/lambda-exec".to_string())
    );

    let report = &outcome.apis[0];
    assert_eq!(report.operation, Some(Operation::Create));
    assert_eq!(report.remote_id.as_deref(), Some("api0"));
    assert!(report.published);
    assert_eq!(
        report.url.as_deref(),
        Some("https://api0.execute-api.eu-west-1.amazonaws.com/v0")
    );
    assert_eq!(gateway.deployments(), [("api0".to_string(), "v0".to_string())]);

    let imported = gateway.imports("DEV-public");
    let integration = integration(&imported[0], "/users/{id}", "get");
    assert_eq!(integration["type"], "aws_proxy");
    assert_eq!(
        integration["uri"],
        "arn:aws:apigateway:eu-west-1:lambda:path/2015-03-31/functions/\
         arn:aws:lambda:eu-west-1:123456789012:function:DEV-users:v0/invocations"
    );
    assert_eq!(
        integration["credentials"],
        "arn:aws:iam::123456789012:role/apigw-invoke"
    );
}

#[tokio::test]
async fn views_filter_the_assembled_document() {
    let fixture = users_project();
    let gateway = Arc::new(MockApiGateway::new());
    let functions = Arc::new(MockFunctions::new());
    orchestrator(&fixture, &gateway, &functions, HookBus::empty())
        .deploy(&ctx(), &options())
        .await
        .expect("deploy");

    // What the provider received.
    let aws = &gateway.imports("DEV-public")[0];
    let operation = &aws["paths"]["/users/{id}"]["get"];
    assert!(operation.get("x-amazon-apigateway-integration").is_some());
    assert!(operation.get("externalDocs").is_none());
    assert!(operation.get("x-gantry").is_none());

    let apis = fixture
        .project(HookBus::empty())
        .assemble()
        .await
        .expect("assemble");
    let doc = apis[0].gen_spec(SpecView::Doc);
    let operation = &doc["paths"]["/users/{id}"]["get"];
    assert!(operation.get("externalDocs").is_some());
    assert!(operation.get("x-amazon-apigateway-integration").is_none());

    let complete = apis[0].gen_spec(SpecView::Complete);
    assert!(complete["paths"]["/users/{id}"]["get"].get("externalDocs").is_some());
    assert_eq!(complete["info"]["description"], "Public surface");
}

#[tokio::test]
async fn redeploy_updates_with_an_identical_document() {
    let fixture = users_project();
    let gateway = Arc::new(MockApiGateway::new());
    let functions = Arc::new(MockFunctions::new());
    let orchestrator = orchestrator(&fixture, &gateway, &functions, HookBus::empty());

    let first = orchestrator.deploy(&ctx(), &options()).await.expect("first");
    let second = orchestrator.deploy(&ctx(), &options()).await.expect("second");

    assert_eq!(first.apis[0].operation, Some(Operation::Create));
    assert_eq!(second.apis[0].operation, Some(Operation::Update));
    assert_eq!(second.apis[0].remote_id, first.apis[0].remote_id);
    assert_eq!(functions.alias("DEV-users", "v0").as_deref(), Some("2"));

    let imports = gateway.imports("DEV-public");
    assert_eq!(imports.len(), 2);
    assert_eq!(
        serde_json::to_vec(&imports[0]).expect("serialize"),
        serde_json::to_vec(&imports[1]).expect("serialize")
    );
}

#[tokio::test]
async fn rejected_api_does_not_stop_its_siblings_but_blocks_publishing() {
    let fixture = users_project();
    fixture.api("admin", json!({"title": "Admin"})).expect("api");
    fixture.api("partner", json!({"title": "Partner"})).expect("api");
    fixture
        .endpoint("users", json!({"x-gantry": {"apis": ["admin", "partner", "public"]}}))
        .expect("fragment");
    let gateway = Arc::new(MockApiGateway::new().rejecting("DEV-partner"));
    let functions = Arc::new(MockFunctions::new());

    let outcome = orchestrator(&fixture, &gateway, &functions, HookBus::empty())
        .deploy(&ctx(), &options())
        .await
        .expect("deploy");

    assert!(outcome.has_failures());
    let ids: Vec<&str> = outcome.apis.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(ids, ["admin", "partner", "public"]);

    for report in [&outcome.apis[0], &outcome.apis[2]] {
        assert_eq!(report.operation, Some(Operation::Create));
        assert!(report.remote_id.is_some());
        assert!(report.failure.is_none());
    }
    let partner = &outcome.apis[1];
    assert!(partner.remote_id.is_none());
    assert!(partner
        .failure
        .as_deref()
        .is_some_and(|f| f.contains("invalid specification")));

    assert!(outcome.apis.iter().all(|r| !r.published));
    assert!(gateway.deployments().is_empty());
}

#[tokio::test]
async fn access_denied_aborts_the_run() {
    let fixture = users_project();
    let gateway = Arc::new(MockApiGateway::new().denying());
    let functions = Arc::new(MockFunctions::new());

    let err = orchestrator(&fixture, &gateway, &functions, HookBus::empty())
        .deploy(&ctx(), &options())
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert!(err.to_string().contains("ImportRestApi"));
}

#[tokio::test]
async fn cors_plugin_adds_preflight_to_the_import() {
    let fixture = users_project();
    fixture
        .api("public", json!({"title": "Public API", "x-gantry": {"cors": true}}))
        .expect("api");
    let gateway = Arc::new(MockApiGateway::new());
    let functions = Arc::new(MockFunctions::new());

    let mut registry = HookRegistry::new();
    registry.register_plugin(&CorsPlugin).expect("register");
    orchestrator(&fixture, &gateway, &functions, registry.freeze())
        .deploy(&ctx(), &options())
        .await
        .expect("deploy");

    let imported = &gateway.imports("DEV-public")[0];
    assert_eq!(integration(imported, "/users/{id}", "options")["type"], "mock");
    assert_eq!(integration(imported, "/users/{id}", "get")["type"], "aws_proxy");
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hooks_without_listeners_pass_payloads_through() {
    let fixture = users_project();
    let project = fixture.project(HookBus::empty());
    let (apis, endpoints) = project.load_specs().await.expect("load");

    let stage = project
        .hooks()
        .fire(
            HookEvent::BeforeAddEndpointsToApis,
            AttachStage {
                apis,
                endpoints: endpoints.into_iter().map(Arc::new).collect(),
            },
        )
        .await
        .expect("fire");
    assert_eq!(stage.apis.len(), 1);
    assert_eq!(stage.endpoints.len(), 1);
}

#[tokio::test]
async fn replaced_endpoints_reach_later_hooks_and_the_caller() {
    let fixture = users_project();
    fixture
        .endpoint("internal/GET", json!({"x-gantry": {"apis": ["public"]}}))
        .expect("endpoint");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HookRegistry::new();
    let first = seen.clone();
    registry
        .on(HookEvent::BeforeAddEndpointsToApis, move |stage: AttachStage| {
            let seen = first.clone();
            async move {
                seen.lock().push(stage.endpoints.len());
                Ok(stage)
            }
        })
        .expect("first");
    registry
        .on(HookEvent::BeforeAddEndpointsToApis, |mut stage: AttachStage| async move {
            stage.endpoints.retain(|e| !e.path().starts_with("/internal"));
            Ok(stage)
        })
        .expect("second");
    let third = seen.clone();
    registry
        .on(HookEvent::BeforeAddEndpointsToApis, move |stage: AttachStage| {
            let seen = third.clone();
            async move {
                seen.lock().push(stage.endpoints.len());
                Ok(stage)
            }
        })
        .expect("third");

    let apis = fixture
        .project(registry.freeze())
        .assemble()
        .await
        .expect("assemble");
    assert_eq!(*seen.lock(), [2, 1]);
    assert_eq!(apis[0].paths(), ["/users/{id}"]);
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_endpoint_walkthrough() {
    let fixture = ProjectFixture::new().expect("fixture");
    fixture
        .endpoint("users/{id}/GET", json!({"x-gantry": {"apis": ["public"]}}))
        .expect("endpoint");
    fixture.api("public", json!({"title": "Public API"})).expect("api");

    let project = fixture.project(HookBus::empty());
    let apis = project.assemble().await.expect("assemble");
    assert_eq!(apis.len(), 1);
    assert_eq!(apis[0].identifier(), "public");
    assert_eq!(apis[0].endpoints().count(), 1);
    assert!(apis[0].gen_spec(SpecView::Aws)["paths"]["/users/{id}"]["get"].is_object());

    let gateway = Arc::new(MockApiGateway::new().with_missing_lookup());
    let functions = Arc::new(MockFunctions::new());
    let outcome = orchestrator(&fixture, &gateway, &functions, HookBus::empty())
        .deploy(&ctx(), &options())
        .await
        .expect("deploy");

    let report = serde_json::to_value(&outcome.apis[0]).expect("serialize");
    assert_eq!(report["operation"], "Create");
    assert!(outcome.lambdas.is_empty());
}
