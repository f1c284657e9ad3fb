//! Readiness gate
//!
//! A tunnel to a resource may only be established once the provision
//! job that produced it has completed. Completion is a monotonic
//! one-time transition observed by polling the store, so the gate is
//! re-checked on every request and never cached.

use thiserror::Error;
use uuid::Uuid;

use tether_db::entities::provision_job;
use tether_db::{Store, StoreError};

#[derive(Debug, Error)]
pub enum GateError {
    /// The owning job has not completed yet. Recoverable; callers may
    /// retry later.
    #[error("provision job has not completed")]
    NotReady,

    /// The job or resource could not be found or read.
    #[error("lookup: {0}")]
    Lookup(#[from] StoreError),
}

/// Look up the job for a build and require its completion marker.
pub async fn ready_job_by_build(
    store: &Store,
    build_id: Uuid,
) -> Result<provision_job::Model, GateError> {
    let job = store.job_by_build(build_id).await?;
    require_complete(job)
}

/// Require the completion marker on a job already referenced by id.
pub async fn ensure_job_complete(
    store: &Store,
    job_id: Uuid,
) -> Result<provision_job::Model, GateError> {
    let job = store.job_by_id(job_id).await?;
    require_complete(job)
}

fn require_complete(job: provision_job::Model) -> Result<provision_job::Model, GateError> {
    if !job.is_complete() {
        return Err(GateError::NotReady);
    }
    Ok(job)
}
