//! Project manifest (`gantry.yaml`).
//!
//! Optional. Locates the specification and lambda directories and holds the
//! per-project deployment settings. Relative paths resolve against the
//! directory holding the manifest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::plugins;

pub const MANIFEST_FILE: &str = "gantry.yaml";

/// A project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectManifest {
    #[serde(default = "default_apis_path")]
    pub apis_path: PathBuf,

    #[serde(default = "default_endpoints_path")]
    pub endpoints_path: PathBuf,

    #[serde(default = "default_lambdas_path")]
    pub lambdas_path: PathBuf,

    /// Pause between successive API deployments, multiplied by position.
    #[serde(default = "default_deploy_delay_ms")]
    pub deploy_delay_ms: u64,

    /// Role API Gateway assumes to invoke lambdas (name or ARN).
    #[serde(default)]
    pub invocation_role: Option<String>,

    /// Lambda alias to deploy to; the stage when unset.
    #[serde(default)]
    pub lambda_alias: Option<String>,

    /// Built-in plugins to enable, in registration order.
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,
}

fn default_apis_path() -> PathBuf {
    PathBuf::from("apis")
}

fn default_endpoints_path() -> PathBuf {
    PathBuf::from("endpoints")
}

fn default_lambdas_path() -> PathBuf {
    PathBuf::from("lambdas")
}

fn default_deploy_delay_ms() -> u64 {
    1000
}

fn default_plugins() -> Vec<String> {
    vec!["cors".to_string()]
}

impl Default for ProjectManifest {
    fn default() -> Self {
        Self {
            apis_path: default_apis_path(),
            endpoints_path: default_endpoints_path(),
            lambdas_path: default_lambdas_path(),
            deploy_delay_ms: default_deploy_delay_ms(),
            invocation_role: None,
            lambda_alias: None,
            plugins: default_plugins(),
        }
    }
}

/// Resolved locations of a project's definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub apis: PathBuf,
    pub endpoints: PathBuf,
    pub lambdas: PathBuf,
}

impl ProjectLayout {
    /// Conventional layout under `root`.
    pub fn conventional(root: &Path) -> Self {
        ProjectManifest::default().layout(root)
    }
}

impl ProjectManifest {
    /// Load the manifest of the project in `project_dir`, or the defaults
    /// when it has none.
    pub fn discover(project_dir: &Path) -> Result<Self, DeployError> {
        let path = project_dir.join(MANIFEST_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            tracing::debug!(project = %project_dir.display(), "no manifest, using defaults");
            Ok(Self::default())
        }
    }

    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|e| DeployError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Parse a manifest from YAML content. An empty document is the default
    /// manifest.
    pub fn parse(content: &str, path: &Path) -> Result<Self, DeployError> {
        let manifest: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| DeployError::Manifest {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };
        manifest.validate(path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<(), DeployError> {
        for name in &self.plugins {
            if plugins::builtin(name).is_none() {
                return Err(DeployError::Manifest {
                    path: path.to_path_buf(),
                    message: format!(
                        "unknown plugin '{}' (available: {})",
                        name,
                        plugins::BUILTIN.join(", ")
                    ),
                });
            }
        }
        Ok(())
    }

    /// Resolve the configured directories against `base`.
    pub fn layout(&self, base: &Path) -> ProjectLayout {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        ProjectLayout {
            apis: resolve(&self.apis_path),
            endpoints: resolve(&self.endpoints_path),
            lambdas: resolve(&self.lambdas_path),
        }
    }

    pub fn deploy_delay(&self) -> Duration {
        Duration::from_millis(self.deploy_delay_ms)
    }
}
