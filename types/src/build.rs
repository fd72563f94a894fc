//! Build and deployment records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildStatus {
    /// Terminal statuses will never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRun {
    pub id: String,
    pub component_id: String,
    pub status: BuildStatus,
    pub commit_hash: String,
    #[serde(default)]
    pub started_at: Option<String>,
}

/// A branch the platform continuously builds and deploys from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTrack {
    pub id: String,
    pub branch: String,
    #[serde(default)]
    pub latest_build_id: Option<String>,
}

/// What is currently running in one environment for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub status: String,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub invoke_url: Option<String>,
    #[serde(default)]
    pub deployed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub critical: bool,
}
