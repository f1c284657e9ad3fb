//! Typed store queries used by the broker

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{provision_job, workspace_agent, workspace_resource};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database: {0}")]
    Database(#[from] DbErr),

    /// A stored blob failed to decode. Indicates data corruption and
    /// must never be papered over with a default.
    #[error("decode stored payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Handle over the broker's persistent state.
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
}

impl Store {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn job_by_id(&self, job_id: Uuid) -> Result<provision_job::Model, StoreError> {
        provision_job::Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound("provision job"))
    }

    pub async fn job_by_build(&self, build_id: Uuid) -> Result<provision_job::Model, StoreError> {
        provision_job::Entity::find()
            .filter(provision_job::Column::BuildId.eq(build_id))
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound("provision job"))
    }

    pub async fn resource_by_id(
        &self,
        resource_id: Uuid,
    ) -> Result<workspace_resource::Model, StoreError> {
        workspace_resource::Entity::find_by_id(resource_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound("workspace resource"))
    }

    pub async fn agent_by_id(&self, agent_id: Uuid) -> Result<workspace_agent::Model, StoreError> {
        workspace_agent::Entity::find_by_id(agent_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound("workspace agent"))
    }

    /// The agent attached to a resource.
    pub async fn agent_by_resource(
        &self,
        resource_id: Uuid,
    ) -> Result<workspace_agent::Model, StoreError> {
        workspace_agent::Entity::find()
            .filter(workspace_agent::Column::ResourceId.eq(resource_id))
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound("workspace agent"))
    }

    /// The resource an agent runs inside.
    pub async fn resource_by_agent(
        &self,
        agent_id: Uuid,
    ) -> Result<workspace_resource::Model, StoreError> {
        let agent = self.agent_by_id(agent_id).await?;
        self.resource_by_id(agent.resource_id).await
    }

    /// Record the agent as seen alive at `now`. Last write wins;
    /// concurrent sessions for one agent may race without harm.
    pub async fn touch_agent(
        &self,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let agent = self.agent_by_id(agent_id).await?;

        let mut active: workspace_agent::ActiveModel = agent.into();
        active.updated_at = Set(Some(now));
        active.update(&self.db).await?;
        Ok(())
    }
}

/// Encode an environment mapping for storage.
pub fn encode_environment(env: &HashMap<String, String>) -> Result<String, serde_json::Error> {
    serde_json::to_string(env)
}

/// Decode an agent's stored environment blob. `None` stays `None`;
/// malformed JSON is a hard [`StoreError::Decode`].
pub fn decode_environment(
    blob: Option<&str>,
) -> Result<Option<HashMap<String, String>>, StoreError> {
    match blob {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}
