//! WorkspaceAgent entity: the in-workspace process a tunnel reaches
//!
//! `updated_at` is the last-seen timestamp maintained by the liveness
//! tracker while a listen session is active. `environment_variables`
//! is an opaque JSON object blob, decoded on read; a malformed blob is
//! a hard error, never an empty default.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workspace_agent")]
pub struct Model {
    /// Agent UUID (primary key). Doubles as the rendezvous channel id
    /// on the signaling bus.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Resource this agent runs inside
    pub resource_id: Uuid,

    /// When the agent was created
    pub created_at: ChronoDateTimeUtc,

    /// Last time a listen session reported the agent alive
    pub updated_at: Option<ChronoDateTimeUtc>,

    /// Cloud instance identity used at provisioning time, if any
    #[sea_orm(nullable)]
    pub instance_id: Option<String>,

    /// Script run when the agent starts, if any
    #[sea_orm(column_type = "Text", nullable)]
    pub startup_script: Option<String>,

    /// JSON-encoded environment variable mapping, if any
    #[sea_orm(column_type = "Text", nullable)]
    pub environment_variables: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Agent belongs to a workspace resource
    #[sea_orm(
        belongs_to = "super::workspace_resource::Entity",
        from = "Column::ResourceId",
        to = "super::workspace_resource::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    WorkspaceResource,
}

impl Related<super::workspace_resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkspaceResource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
