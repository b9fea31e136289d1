//! Where a run deploys to.

/// Target of one deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployContext {
    pub region: String,
    pub stage: String,
    pub environment: String,
}

impl DeployContext {
    pub fn new(
        region: impl Into<String>,
        stage: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            stage: stage.into(),
            environment: environment.into(),
        }
    }

    /// Remote name of a local resource: `{environment}-{identifier}`.
    pub fn remote_name(&self, identifier: &str) -> String {
        if self.environment.is_empty() {
            identifier.to_string()
        } else {
            format!("{}-{}", self.environment, identifier)
        }
    }

    /// Public invoke URL of a published stage.
    pub fn invoke_url(&self, rest_api_id: &str) -> String {
        format!(
            "https://{}.execute-api.{}.amazonaws.com/{}",
            rest_api_id, self.region, self.stage
        )
    }
}
