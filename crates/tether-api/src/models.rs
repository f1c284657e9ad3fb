use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Agent attached to a provisioned resource
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentView {
    /// Unique agent identifier, also its rendezvous channel
    pub id: Uuid,
    /// Owning resource
    pub resource_id: Uuid,
    /// When the agent record was created
    pub created_at: DateTime<Utc>,
    /// Last liveness update, absent until the agent first connects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Cloud instance identity, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Script run on agent start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script: Option<String>,
    /// Environment injected into the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<HashMap<String, String>>,
}

/// Provisioned infrastructure resource
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceView {
    /// Unique resource identifier
    pub id: Uuid,
    /// Provision job that produced the resource
    pub job_id: Uuid,
    /// Resource name from the provisioner
    pub name: String,
    /// Provisioner type, e.g. `docker_container`
    pub resource_type: String,
    /// When the resource record was created
    pub created_at: DateTime<Utc>,
    /// Agent running inside the resource, if it has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentView>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}
