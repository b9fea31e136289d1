//! Gantry command line.
//!
//! `deploy` runs the whole pipeline against AWS; the `inspect-*` commands
//! print assembled documents without touching the provider.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use gantry_lib::aws::{
    credentials_from_env, AwsApiGateway, AwsClient, AwsFunctions, IamRoleResolver, ProviderError,
};
use gantry_lib::lambda::PrebuiltArchive;
use gantry_lib::logging::{init_logging, LogConfig, LogFormat};
use gantry_lib::{
    plugins, report, DeployContext, DeployError, DeployOptions, HookBus, HookRegistry,
    IntegrationError, LambdaIntegrationLoader, LambdaSelection, LambdaServices, Orchestrator,
    Project, ProjectManifest,
};
use gantry_spec::{HttpMethod, SpecView};

const EXIT_API_FAILED: u8 = 1;
const EXIT_LOAD: u8 = 3;
const EXIT_PERMISSION: u8 = 4;
const EXIT_NOTHING_TO_DEPLOY: u8 = 5;
const EXIT_REMOTE: u8 = 6;

#[derive(Parser, Debug)]
#[command(
    name = "gantry",
    about = "Deploy directory-described APIs to AWS API Gateway",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Project directory (holds gantry.yaml, apis/, endpoints/, lambdas/).
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// AWS region to deploy to.
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Send every AWS call to this URL instead of the regional endpoints.
    #[arg(long, global = true, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// API Gateway stage (and default lambda alias).
    #[arg(long, global = true, default_value = "v0")]
    stage: String,

    /// Environment prefix of remote resource names.
    #[arg(long, global = true, default_value = "DEV")]
    environment: String,

    /// Log level, used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty).
    #[arg(long, global = true, default_value = "pretty", value_parser = ["json", "pretty"])]
    log_format: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy lambdas and APIs, then publish the APIs to the stage.
    Deploy {
        /// Only deploy this API (repeatable).
        #[arg(long = "api")]
        apis: Vec<String>,

        /// Only deploy this lambda (repeatable).
        #[arg(long = "lambda")]
        lambdas: Vec<String>,

        /// Deploy every lambda, referenced or not.
        #[arg(long, conflicts_with = "lambdas")]
        all_lambdas: bool,

        /// Report format (text or json).
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Print the assembled document of one API.
    InspectApi {
        identifier: String,

        /// View to print: doc, aws or complete.
        #[arg(long, default_value = "aws")]
        spec: SpecView,
    },

    /// Print the merged document of one endpoint.
    InspectEndpoint {
        method: HttpMethod,
        path: String,

        /// View to print: doc, aws or complete.
        #[arg(long, default_value = "aws")]
        spec: SpecView,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log = LogConfig {
        level: cli.log_level.clone(),
        format: LogFormat::parse(&cli.log_format).unwrap_or_default(),
    };
    if let Err(e) = init_logging(&log) {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_LOAD);
    }

    let result = match &cli.command {
        Command::Deploy {
            apis,
            lambdas,
            all_lambdas,
            format,
        } => {
            let selection = if *all_lambdas {
                LambdaSelection::All
            } else if !lambdas.is_empty() {
                LambdaSelection::Only(lambdas.clone())
            } else {
                LambdaSelection::Referenced
            };
            run_deploy(&cli, apis.clone(), selection, format).await
        }
        Command::InspectApi { identifier, spec } => run_inspect_api(&cli, identifier, *spec).await,
        Command::InspectEndpoint { method, path, spec } => {
            run_inspect_endpoint(&cli, *method, path, *spec).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn load_project(cli: &Cli) -> anyhow::Result<(ProjectManifest, Project)> {
    let manifest = ProjectManifest::discover(&cli.project)?;
    let hooks = build_hooks(&manifest)?;
    let project = Project::new(manifest.layout(&cli.project), Arc::new(hooks));
    Ok((manifest, project))
}

fn build_hooks(manifest: &ProjectManifest) -> Result<HookBus, DeployError> {
    let mut registry = HookRegistry::new();
    for name in &manifest.plugins {
        if let Some(plugin) = plugins::builtin(name) {
            registry.register_plugin(plugin.as_ref())?;
        }
    }
    Ok(registry.freeze())
}

async fn run_deploy(
    cli: &Cli,
    apis: Vec<String>,
    selection: LambdaSelection,
    format: &str,
) -> anyhow::Result<ExitCode> {
    let (manifest, project) = load_project(cli)?;
    let Some(region) = cli.region.clone() else {
        bail!("no region given: pass --region or set AWS_REGION");
    };
    let ctx = DeployContext::new(region, cli.stage.clone(), cli.environment.clone());

    let mut client = AwsClient::new(credentials_from_env().map_err(DeployError::from)?)
        .map_err(DeployError::from)?;
    if let Some(url) = &cli.endpoint_url {
        client = client.with_endpoint(url.as_str());
    }
    let services = LambdaServices::new(
        Arc::new(AwsFunctions::new(client.clone())),
        Arc::new(IamRoleResolver::new(client.clone())),
        Arc::new(PrebuiltArchive),
    );
    let lambdas = LambdaIntegrationLoader::new(project.layout().lambdas.clone(), services)
        .with_selection(selection)
        .with_alias(manifest.lambda_alias.clone())
        .with_invocation_role(manifest.invocation_role.clone());
    let orchestrator = Orchestrator::new(project, Arc::new(AwsApiGateway::new(client)))
        .with_loader(Arc::new(lambdas));

    let options = DeployOptions {
        apis,
        deploy_delay: manifest.deploy_delay(),
    };
    let outcome = orchestrator.deploy(&ctx, &options).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("failed to serialize the report")?
        );
    } else {
        print!("{}", report::render(&outcome));
    }

    if outcome.has_failures() {
        Ok(ExitCode::from(EXIT_API_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_inspect_api(cli: &Cli, identifier: &str, view: SpecView) -> anyhow::Result<ExitCode> {
    let (_, project) = load_project(cli)?;
    let apis = project.assemble().await?;
    let Some(api) = apis.iter().find(|a| a.identifier() == identifier) else {
        return Err(DeployError::NoDeployableTarget(format!("no API named '{identifier}'")).into());
    };
    println!("{}", serde_json::to_string_pretty(&api.gen_spec(view))?);
    Ok(ExitCode::SUCCESS)
}

async fn run_inspect_endpoint(
    cli: &Cli,
    method: HttpMethod,
    path: &str,
    view: SpecView,
) -> anyhow::Result<ExitCode> {
    let (_, project) = load_project(cli)?;
    let (_, endpoints) = project.load_specs().await?;
    let Some(endpoint) = endpoints
        .iter()
        .find(|e| e.method() == method && e.path() == path)
    else {
        return Err(
            DeployError::NoDeployableTarget(format!("no endpoint {method} {path}")).into(),
        );
    };
    println!("{}", serde_json::to_string_pretty(&endpoint.spec(view))?);
    Ok(ExitCode::SUCCESS)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<DeployError>() {
        Some(DeployError::PermissionDenied { .. }) => EXIT_PERMISSION,
        Some(DeployError::NoDeployableTarget(_)) => EXIT_NOTHING_TO_DEPLOY,
        Some(DeployError::Provider(ProviderError::MissingCredentials)) => EXIT_LOAD,
        Some(DeployError::Provider(_) | DeployError::NotDeployed(_)) => EXIT_REMOTE,
        Some(DeployError::Integration(IntegrationError::Provider { .. })) => EXIT_REMOTE,
        Some(_) | None => EXIT_LOAD,
    }
}
