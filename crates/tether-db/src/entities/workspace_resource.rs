//! WorkspaceResource entity: one infrastructure object produced by a
//! provision job, with zero or one attached agent

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workspace_resource")]
pub struct Model {
    /// Resource UUID (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Provision job that produced this resource
    pub job_id: Uuid,

    /// Resource name (e.g. "main")
    pub name: String,

    /// Provider resource type (e.g. "docker_container")
    pub resource_type: String,

    /// Agent attached to this resource, if any
    pub agent_id: Option<Uuid>,

    /// When the resource was created
    pub created_at: ChronoDateTimeUtc,
}

impl Model {
    pub fn has_agent(&self) -> bool {
        self.agent_id.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Resource belongs to a provision job
    #[sea_orm(
        belongs_to = "super::provision_job::Entity",
        from = "Column::JobId",
        to = "super::provision_job::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ProvisionJob,

    /// Agent running inside this resource
    #[sea_orm(has_many = "super::workspace_agent::Entity")]
    WorkspaceAgent,
}

impl Related<super::provision_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProvisionJob.def()
    }
}

impl Related<super::workspace_agent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkspaceAgent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
