//! CLI regression tests for the `gantry` binary.
//!
//! These tests invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes, and output formats.
//!
//! Run with: `cargo test -p gantry-test`
//! Requires the `gantry` binary to be built first (`cargo build -p gantry`).

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::ProjectFixture;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `gantry` binary, isolated from
/// the caller's AWS environment.
fn gantry() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("gantry")
        .expect("gantry binary not found: run `cargo build -p gantry` first");
    for var in [
        "AWS_REGION",
        "AWS_ENDPOINT_URL",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn public_project() -> ProjectFixture {
    let fixture = ProjectFixture::new().expect("fixture");
    fixture
        .api("public", json!({"title": "Public API"}))
        .expect("api");
    fixture
        .endpoint(
            "users/{id}/GET",
            json!({
                "x-gantry": {"apis": ["public"]},
                "summary": "Fetch one user",
                "externalDocs": {"url": "https://docs.example.com"}
            }),
        )
        .expect("endpoint");
    fixture
}

// ---------------------------------------------------------------------------
// gantry inspect-*
// ---------------------------------------------------------------------------

#[test]
fn inspect_api_prints_the_provider_view() {
    let fixture = public_project();
    let output = gantry()
        .arg("inspect-api")
        .arg("public")
        .arg("--project")
        .arg(fixture.root())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let doc: serde_json::Value = serde_json::from_slice(&output).expect("stdout should be JSON");
    assert_eq!(doc["swagger"], "2.0");
    assert_eq!(doc["info"]["title"], "Public API");
    let operation = &doc["paths"]["/users/{id}"]["get"];
    assert_eq!(operation["summary"], "Fetch one user");
    assert!(operation.get("externalDocs").is_none());
}

#[test]
fn inspect_api_doc_view_keeps_documentation() {
    let fixture = public_project();
    gantry()
        .args(["inspect-api", "public", "--spec", "doc", "--project"])
        .arg(fixture.root())
        .assert()
        .success()
        .stdout(contains("externalDocs"));
}

#[test]
fn inspect_unknown_api_exits_five() {
    let fixture = public_project();
    gantry()
        .args(["inspect-api", "admin", "--project"])
        .arg(fixture.root())
        .assert()
        .failure()
        .code(5)
        .stderr(contains("no API named 'admin'"));
}

#[test]
fn inspect_endpoint_accepts_lowercase_methods() {
    let fixture = public_project();
    gantry()
        .args(["inspect-endpoint", "get", "/users/{id}", "--spec", "complete", "--project"])
        .arg(fixture.root())
        .assert()
        .success()
        .stdout(contains("x-gantry"));
}

#[test]
fn invalid_view_is_a_usage_error() {
    gantry()
        .args(["inspect-api", "public", "--spec", "swagger"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn malformed_fragment_exits_three() {
    let fixture = public_project();
    std::fs::write(
        fixture.root().join("endpoints/users/spec.json"),
        "{not json",
    )
    .expect("write");
    gantry()
        .args(["inspect-api", "public", "--project"])
        .arg(fixture.root())
        .assert()
        .failure()
        .code(3);
}

#[test]
fn unknown_manifest_plugin_exits_three() {
    let fixture = public_project();
    fixture.manifest("plugins: [graphql]\n").expect("manifest");
    gantry()
        .args(["inspect-api", "public", "--project"])
        .arg(fixture.root())
        .assert()
        .failure()
        .code(3)
        .stderr(contains("unknown plugin 'graphql'"));
}

// ---------------------------------------------------------------------------
// gantry deploy
// ---------------------------------------------------------------------------

#[test]
fn deploy_without_region_exits_three() {
    let fixture = public_project();
    gantry()
        .args(["deploy", "--project"])
        .arg(fixture.root())
        .assert()
        .failure()
        .code(3)
        .stderr(contains("AWS_REGION"));
}

#[test]
fn deploy_without_credentials_exits_three() {
    let fixture = public_project();
    gantry()
        .args(["deploy", "--region", "eu-west-1", "--project"])
        .arg(fixture.root())
        .assert()
        .failure()
        .code(3)
        .stderr(contains("AWS_ACCESS_KEY_ID"));
}

#[test]
fn deploy_of_an_empty_project_exits_five() {
    let fixture = ProjectFixture::new().expect("fixture");
    gantry()
        .args(["deploy", "--region", "eu-west-1", "--project"])
        .arg(fixture.root())
        .env("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .assert()
        .failure()
        .code(5);
}

#[test]
fn lambda_flags_conflict() {
    gantry()
        .args(["deploy", "--all-lambdas", "--lambda", "users"])
        .assert()
        .failure()
        .code(2);
}

#[tokio::test(flavor = "multi_thread")]
async fn deploy_against_a_mock_endpoint_prints_the_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/restapis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"item": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/restapis"))
        .and(query_param("mode", "import"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "abc123", "name": "QA-public"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/restapis/abc123/deployments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "dep1"})))
        .mount(&server)
        .await;

    let fixture = public_project();
    fixture.manifest("deploy_delay_ms: 0\n").expect("manifest");
    let mut cmd = gantry();
    cmd.args(["deploy", "--region", "eu-west-1", "--environment", "QA", "--project"])
        .arg(fixture.root())
        .env("AWS_ENDPOINT_URL", server.uri())
        .env("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "secret");

    let output = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .expect("join")
        .expect("run gantry");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).expect("UTF-8");
    assert!(stdout.starts_with("API "));
    assert!(stdout.contains("QA-public"));
    assert!(stdout.contains("Create"));
    assert!(stdout.contains("https://abc123.execute-api.eu-west-1.amazonaws.com/v0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn access_denied_exits_four() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/restapis"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "User is not authorized to perform: apigateway:GET"
        })))
        .mount(&server)
        .await;

    let fixture = public_project();
    let mut cmd = gantry();
    cmd.args(["deploy", "--region", "eu-west-1", "--project"])
        .arg(fixture.root())
        .env("AWS_ENDPOINT_URL", server.uri())
        .env("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "secret");

    let output = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .expect("join")
        .expect("run gantry");

    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("permission denied"));
}
