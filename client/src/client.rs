//! The platform client facade.
//!
//! Method names and envelope shapes follow the CLI's API surface: each
//! namespace (`project/`, `component/`, `build/`, `deployment/`, `auth/`,
//! `repo/`, `connections/`) wraps its payload in a one-field envelope, with
//! the exception of the connections calls, which return their payload bare.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use nimbus_rpc::RequestGateway;
use nimbus_types::{
    BuildRun, Component, ComponentEndpoint, Connection, CreateComponentRequest,
    CreateProjectRequest, DeploymentStatus, DeploymentTrack, Environment, Project, Region,
    UserInfo,
};

use crate::error::ClientError;

/// Budget for interactive auth calls; kept short so a wedged CLI cannot
/// stall the sign-in UI.
const AUTH_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Answer of `repo/isRepoAuthorized`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAuthorization {
    pub is_authorized: bool,
    #[serde(default)]
    pub requires_credentials: bool,
}

pub struct PlatformClient {
    gateway: Arc<RequestGateway>,
}

impl PlatformClient {
    #[must_use]
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ClientError> {
        tracing::debug!(method, "platform call");
        Ok(self.gateway.call(method, params).await?)
    }

    fn decode<T: DeserializeOwned>(method: &str, value: serde_json::Value) -> Result<T, ClientError> {
        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            method: method.to_string(),
            source,
        })
    }

    fn encode<T: serde::Serialize>(method: &str, params: &T) -> Result<serde_json::Value, ClientError> {
        serde_json::to_value(params).map_err(|source| ClientError::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// Call and decode one envelope field.
    async fn call_field<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        field: &str,
    ) -> Result<T, ClientError> {
        let reply = self.call(method, params).await?;
        let inner = reply.get(field).cloned().unwrap_or(serde_json::Value::Null);
        Self::decode(method, inner)
    }

    /// Like [`Self::call_field`], but an absent or null list decodes as
    /// empty rather than failing.
    async fn call_list<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        field: &str,
    ) -> Result<Vec<T>, ClientError> {
        let reply = self.call(method, params).await?;
        match reply.get(field) {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(inner) => Self::decode(method, inner.clone()),
        }
    }

    // ── project ────────────────────────────────────────────────────────

    pub async fn create_project(&self, req: &CreateProjectRequest) -> Result<Project, ClientError> {
        let params = Self::encode("project/create", req)?;
        self.call_field("project/create", Some(params), "project").await
    }

    pub async fn get_projects(&self, org_id: &str) -> Result<Vec<Project>, ClientError> {
        self.call_list(
            "project/getProjects",
            Some(serde_json::json!({"orgID": org_id})),
            "projects",
        )
        .await
    }

    pub async fn get_project_envs(&self, project_id: &str) -> Result<Vec<Environment>, ClientError> {
        self.call_list(
            "project/getEnvs",
            Some(serde_json::json!({"projectId": project_id})),
            "envs",
        )
        .await
    }

    // ── component ──────────────────────────────────────────────────────

    pub async fn create_component(
        &self,
        req: &CreateComponentRequest,
    ) -> Result<Component, ClientError> {
        let params = Self::encode("component/create", req)?;
        self.call_field("component/create", Some(params), "component")
            .await
    }

    pub async fn get_component_list(&self, project_id: &str) -> Result<Vec<Component>, ClientError> {
        self.call_list(
            "component/getList",
            Some(serde_json::json!({"projectId": project_id})),
            "components",
        )
        .await
    }

    pub async fn get_component(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<Component, ClientError> {
        self.call_field(
            "component/getItem",
            Some(serde_json::json!({"projectId": project_id, "name": name})),
            "component",
        )
        .await
    }

    pub async fn delete_component(&self, component_id: &str) -> Result<(), ClientError> {
        self.call(
            "component/delete",
            Some(serde_json::json!({"componentId": component_id})),
        )
        .await?;
        Ok(())
    }

    pub async fn get_component_endpoints(
        &self,
        component_id: &str,
        env_id: &str,
    ) -> Result<Vec<ComponentEndpoint>, ClientError> {
        self.call_list(
            "component/getEndpoints",
            Some(serde_json::json!({"componentId": component_id, "envId": env_id})),
            "endpoints",
        )
        .await
    }

    pub async fn get_deployment_tracks(
        &self,
        component_id: &str,
    ) -> Result<Vec<DeploymentTrack>, ClientError> {
        self.call_list(
            "component/getDeploymentTracks",
            Some(serde_json::json!({"componentId": component_id})),
            "deploymentTracks",
        )
        .await
    }

    // ── build / deployment ─────────────────────────────────────────────

    pub async fn create_build(
        &self,
        component_id: &str,
        track_id: &str,
        commit_hash: &str,
    ) -> Result<BuildRun, ClientError> {
        self.call_field(
            "build/create",
            Some(serde_json::json!({
                "componentId": component_id,
                "deploymentTrackId": track_id,
                "commitHash": commit_hash,
            })),
            "build",
        )
        .await
    }

    pub async fn get_builds(
        &self,
        component_id: &str,
        track_id: &str,
    ) -> Result<Vec<BuildRun>, ClientError> {
        self.call_list(
            "build/getList",
            Some(serde_json::json!({
                "componentId": component_id,
                "deploymentTrackId": track_id,
            })),
            "builds",
        )
        .await
    }

    /// Full build log of one run, as the platform stores it.
    pub async fn get_build_logs(
        &self,
        component_id: &str,
        build_id: &str,
    ) -> Result<String, ClientError> {
        self.call_field(
            "build/getLogs",
            Some(serde_json::json!({
                "componentId": component_id,
                "buildId": build_id,
            })),
            "logs",
        )
        .await
    }

    pub async fn create_deployment(
        &self,
        component_id: &str,
        env_id: &str,
        build_id: &str,
    ) -> Result<(), ClientError> {
        self.call(
            "deployment/create",
            Some(serde_json::json!({
                "componentId": component_id,
                "envId": env_id,
                "buildId": build_id,
            })),
        )
        .await?;
        Ok(())
    }

    pub async fn get_deployment_status(
        &self,
        component_id: &str,
        env_id: &str,
    ) -> Result<DeploymentStatus, ClientError> {
        self.call_field(
            "deployment/getStatus",
            Some(serde_json::json!({"componentId": component_id, "envId": env_id})),
            "deployment",
        )
        .await
    }

    // ── auth ───────────────────────────────────────────────────────────

    pub async fn get_user_info(&self) -> Result<UserInfo, ClientError> {
        self.call_field("auth/getUserInfo", None, "userInfo").await
    }

    pub async fn get_sign_in_url(&self, callback_url: &str) -> Result<String, ClientError> {
        tracing::debug!("platform call auth/getSignInUrl");
        let reply = self
            .gateway
            .call_with_timeout(
                "auth/getSignInUrl",
                Some(serde_json::json!({"callbackUrl": callback_url})),
                AUTH_CALL_TIMEOUT,
            )
            .await?;
        let inner = reply
            .get("loginUrl")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Self::decode("auth/getSignInUrl", inner)
    }

    pub async fn sign_in_with_auth_code(
        &self,
        auth_code: &str,
        region: Option<Region>,
    ) -> Result<UserInfo, ClientError> {
        self.call_field(
            "auth/signInWithAuthCode",
            Some(serde_json::json!({
                "authCode": auth_code,
                "region": region.map(Region::as_str),
            })),
            "userInfo",
        )
        .await
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.gateway
            .call_with_timeout("auth/signOut", None, AUTH_CALL_TIMEOUT)
            .await?;
        Ok(())
    }

    pub async fn get_current_region(&self) -> Result<Region, ClientError> {
        self.call_field("auth/getCurrentRegion", None, "region").await
    }

    // ── repo ───────────────────────────────────────────────────────────

    pub async fn get_repo_branches(&self, repo_url: &str) -> Result<Vec<String>, ClientError> {
        self.call_list(
            "repo/getBranches",
            Some(serde_json::json!({"repoUrl": repo_url})),
            "branches",
        )
        .await
    }

    pub async fn is_repo_authorized(&self, repo_url: &str) -> Result<RepoAuthorization, ClientError> {
        let reply = self
            .call(
                "repo/isRepoAuthorized",
                Some(serde_json::json!({"repoUrl": repo_url})),
            )
            .await?;
        Self::decode("repo/isRepoAuthorized", reply)
    }

    // ── connections ────────────────────────────────────────────────────

    pub async fn get_connections(&self, component_id: &str) -> Result<Vec<Connection>, ClientError> {
        let reply = self
            .call(
                "connections/getConnections",
                Some(serde_json::json!({"componentId": component_id})),
            )
            .await?;
        if reply.is_null() {
            return Ok(Vec::new());
        }
        Self::decode("connections/getConnections", reply)
    }

    pub async fn get_connection(&self, connection_id: &str) -> Result<Connection, ClientError> {
        let reply = self
            .call(
                "connections/getConnectionItem",
                Some(serde_json::json!({"connectionId": connection_id})),
            )
            .await?;
        Self::decode("connections/getConnectionItem", reply)
    }

    pub async fn delete_connection(&self, connection_id: &str) -> Result<(), ClientError> {
        self.call(
            "connections/deleteConnection",
            Some(serde_json::json!({"connectionId": connection_id})),
        )
        .await?;
        Ok(())
    }
}
