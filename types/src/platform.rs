//! Organization, project, and component records.

use serde::{Deserialize, Serialize};

/// Deployment tier an environment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentTier {
    Dev,
    Stage,
    Prod,
}

impl EnvironmentTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Stage => "stage",
            Self::Prod => "prod",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Org {
    pub id: String,
    pub handle: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub handler: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// Component kind as the platform names it, e.g. "service" or "webApp".
    pub kind: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// A network-visible endpoint exposed by a deployed component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEndpoint {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
}

/// A marketplace or component-to-component connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub target_service: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub org_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComponentRequest {
    pub project_id: String,
    pub name: String,
    pub kind: String,
    pub repository_url: String,
    pub branch: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_decodes_with_optional_fields_missing() {
        let c: Component = serde_json::from_value(serde_json::json!({
            "id": "c-1",
            "projectId": "p-1",
            "name": "orders",
            "kind": "service"
        }))
        .unwrap();
        assert_eq!(c.project_id, "p-1");
        assert!(c.repository_url.is_none());
    }

    #[test]
    fn create_project_request_omits_absent_region() {
        let req = CreateProjectRequest {
            org_id: "o-1".into(),
            name: "demo".into(),
            region: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("region").is_none(), "region must be omitted, not null");
        assert_eq!(v["orgId"], "o-1");
    }

    #[test]
    fn tier_round_trips_lowercase() {
        assert_eq!(serde_json::to_value(EnvironmentTier::Prod).unwrap(), "prod");
        let t: EnvironmentTier = serde_json::from_value(serde_json::json!("stage")).unwrap();
        assert_eq!(t, EnvironmentTier::Stage);
    }
}
