//! Database entities

pub mod provision_job;
pub mod workspace_agent;
pub mod workspace_resource;

pub use provision_job::Entity as ProvisionJob;
pub use workspace_agent::Entity as WorkspaceAgent;
pub use workspace_resource::Entity as WorkspaceResource;

pub mod prelude {
    pub use super::provision_job::Entity as ProvisionJob;
    pub use super::workspace_agent::Entity as WorkspaceAgent;
    pub use super::workspace_resource::Entity as WorkspaceResource;
}
