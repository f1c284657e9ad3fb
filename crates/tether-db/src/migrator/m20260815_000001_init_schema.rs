//! Initial schema: provision jobs, workspace resources, workspace agents

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProvisionJob::Table)
                    .if_not_exists()
                    .col(uuid(ProvisionJob::Id).primary_key())
                    .col(uuid(ProvisionJob::BuildId).not_null().unique_key())
                    .col(
                        timestamp_with_time_zone(ProvisionJob::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(ProvisionJob::CompletedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkspaceResource::Table)
                    .if_not_exists()
                    .col(uuid(WorkspaceResource::Id).primary_key())
                    .col(uuid(WorkspaceResource::JobId).not_null())
                    .col(string_len(WorkspaceResource::Name, 255).not_null())
                    .col(string_len(WorkspaceResource::ResourceType, 255).not_null())
                    .col(uuid_null(WorkspaceResource::AgentId))
                    .col(
                        timestamp_with_time_zone(WorkspaceResource::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_workspace_resource_job")
                            .from(WorkspaceResource::Table, WorkspaceResource::JobId)
                            .to(ProvisionJob::Table, ProvisionJob::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_workspace_resource_job_id")
                    .table(WorkspaceResource::Table)
                    .col(WorkspaceResource::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkspaceAgent::Table)
                    .if_not_exists()
                    .col(uuid(WorkspaceAgent::Id).primary_key())
                    .col(uuid(WorkspaceAgent::ResourceId).not_null())
                    .col(
                        timestamp_with_time_zone(WorkspaceAgent::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(WorkspaceAgent::UpdatedAt))
                    .col(string_null(WorkspaceAgent::InstanceId))
                    .col(text_null(WorkspaceAgent::StartupScript))
                    .col(text_null(WorkspaceAgent::EnvironmentVariables))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_workspace_agent_resource")
                            .from(WorkspaceAgent::Table, WorkspaceAgent::ResourceId)
                            .to(WorkspaceResource::Table, WorkspaceResource::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_workspace_agent_resource_id")
                    .table(WorkspaceAgent::Table)
                    .col(WorkspaceAgent::ResourceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorkspaceAgent::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkspaceResource::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProvisionJob::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProvisionJob {
    #[sea_orm(iden = "provision_job")]
    Table,
    Id,
    BuildId,
    CreatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum WorkspaceResource {
    #[sea_orm(iden = "workspace_resource")]
    Table,
    Id,
    JobId,
    Name,
    ResourceType,
    AgentId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WorkspaceAgent {
    #[sea_orm(iden = "workspace_agent")]
    Table,
    Id,
    ResourceId,
    CreatedAt,
    UpdatedAt,
    InstanceId,
    StartupScript,
    EnvironmentVariables,
}
