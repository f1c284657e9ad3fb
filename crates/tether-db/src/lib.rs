//! Broker persistence layer
//!
//! SeaORM entities and typed queries for provision jobs, workspace
//! resources, and workspace agents. The broker only reads this state
//! and bumps agent last-seen timestamps; rows are created by
//! provisioning and retired by workspace lifecycle, both external.

pub mod entities;
pub mod migrator;
pub mod store;

pub use store::{Store, StoreError};

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Connect to the database at `url` (e.g. `sqlite::memory:`,
/// `postgres://...`).
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(url).await?;
    info!(backend = ?db.get_database_backend(), "database connected");
    Ok(db)
}

/// Apply any pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    migrator::Migrator::up(db, None).await
}
