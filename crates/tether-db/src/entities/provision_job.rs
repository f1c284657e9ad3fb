//! ProvisionJob entity: one provisioning run for a build
//!
//! `completed_at` is the completion marker; a tunnel to any resource
//! this job produced may be established only once it is set.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "provision_job")]
pub struct Model {
    /// Job UUID (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Build this job provisioned
    #[sea_orm(unique)]
    pub build_id: Uuid,

    /// When the job was created
    pub created_at: ChronoDateTimeUtc,

    /// When the job finished (NULL = still running)
    pub completed_at: Option<ChronoDateTimeUtc>,
}

impl Model {
    /// Whether the completion marker is set.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Resources produced by this job
    #[sea_orm(has_many = "super::workspace_resource::Entity")]
    WorkspaceResource,
}

impl Related<super::workspace_resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkspaceResource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
