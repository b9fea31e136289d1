//! ProjectFixture: an on-disk gantry project in a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;

use gantry_lib::{HookBus, Project, ProjectLayout};

/// Errors from fixture operations.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A project directory laid out the conventional way.
///
/// ```text
/// <root>/apis/<id>/spec.json
/// <root>/endpoints/<segments>/<METHOD>/spec.json
/// <root>/lambdas/<id>/{config.json,package.zip}
/// ```
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    pub fn new() -> Result<Self, FixtureError> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::conventional(self.root())
    }

    /// A [`Project`] over this fixture with the given hooks.
    pub fn project(&self, hooks: HookBus) -> Project {
        Project::new(self.layout(), Arc::new(hooks))
    }

    /// Write `apis/<identifier>/spec.json`.
    pub fn api(&self, identifier: &str, spec: Value) -> Result<(), FixtureError> {
        self.fragment(&format!("apis/{identifier}"), spec)
    }

    /// Write an endpoint fragment. `resource` is relative to `endpoints/`
    /// and may stop at an intermediate segment (`users`) or name a leaf
    /// (`users/{id}/GET`).
    pub fn endpoint(&self, resource: &str, spec: Value) -> Result<(), FixtureError> {
        self.fragment(&format!("endpoints/{resource}"), spec)
    }

    /// Write `spec.json` into `relative_dir`, creating it.
    pub fn fragment(&self, relative_dir: &str, spec: Value) -> Result<(), FixtureError> {
        let dir = self.root().join(relative_dir);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("spec.json"), spec.to_string())?;
        Ok(())
    }

    /// Write a lambda directory with its configuration and a package.
    pub fn lambda(&self, identifier: &str, config: Value) -> Result<PathBuf, FixtureError> {
        let dir = self.root().join("lambdas").join(identifier);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("config.json"), config.to_string())?;
        std::fs::write(dir.join("package.zip"), b"PK\x03\x04fixture")?;
        Ok(dir)
    }

    /// Write `gantry.yaml`.
    pub fn manifest(&self, content: &str) -> Result<(), FixtureError> {
        std::fs::write(self.root().join("gantry.yaml"), content)?;
        Ok(())
    }
}
