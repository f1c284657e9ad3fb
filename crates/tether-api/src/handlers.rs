use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use tether_broker::gate::{self, GateError};
use tether_broker::liveness::heartbeat;
use tether_broker::{relay_dial, relay_listen, RelayOptions, HEARTBEAT_INTERVAL};
use tether_db::entities::{workspace_agent, workspace_resource};
use tether_db::store::decode_environment;
use tether_db::StoreError;
use tether_session::{Session, SessionRole};

use crate::models::*;
use crate::rbac::{Action, Subject, Unauthorized};
use crate::{ws, AppState};

/// Request failure at the HTTP boundary.
///
/// Clients see only the mapped status and a generic message; lookup
/// and decode causes stay in the server log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("provision job has not completed")]
    NotReady,

    #[error("resource has no agent")]
    NoAgent,

    #[error(transparent)]
    Forbidden(#[from] Unauthorized),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::NotReady => ApiError::NotReady,
            GateError::Lookup(e) => ApiError::Store(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotReady => (StatusCode::PRECONDITION_FAILED, self.to_string()),
            ApiError::NoAgent => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Forbidden(denied) => {
                warn!("{}", denied.detail());
                (StatusCode::FORBIDDEN, "forbidden".to_string())
            }
            ApiError::Store(e) => {
                error!(cause = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Health check
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get a provisioned resource with its agent
#[utoipa::path(
    get,
    path = "/api/builds/{build}/resources/{resource}",
    params(
        ("build" = Uuid, Path, description = "Build ID"),
        ("resource" = Uuid, Path, description = "Resource ID")
    ),
    responses(
        (status = 200, description = "Resource information", body = ResourceView),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 412, description = "Provisioning has not completed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "resources"
)]
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path((build, resource)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<ResourceView>, ApiError> {
    let subject = Subject::from_headers(&headers);
    state
        .authorizer
        .authorize(&subject, Action::Read, &format!("resource:{resource}"))?;

    let job = gate::ready_job_by_build(&state.store, build).await?;
    let resource = state.store.resource_by_id(resource).await?;
    if resource.job_id != job.id {
        return Err(StoreError::NotFound("workspace resource").into());
    }

    let agent = match resource.agent_id {
        Some(agent_id) => {
            let agent = state.store.agent_by_id(agent_id).await?;
            Some(agent_view(agent)?)
        }
        None => None,
    };

    Ok(Json(ResourceView {
        id: resource.id,
        job_id: resource.job_id,
        name: resource.name,
        resource_type: resource.resource_type,
        created_at: resource.created_at,
        agent,
    }))
}

fn agent_view(agent: workspace_agent::Model) -> Result<AgentView, ApiError> {
    let environment_variables = decode_environment(agent.environment_variables.as_deref())?;
    Ok(AgentView {
        id: agent.id,
        resource_id: agent.resource_id,
        created_at: agent.created_at,
        updated_at: agent.updated_at,
        instance_id: agent.instance_id,
        startup_script: agent.startup_script,
        environment_variables,
    })
}

/// Resolve and gate a dial target before the connection is upgraded.
pub async fn prepare_dial(
    state: &AppState,
    resource_id: Uuid,
) -> Result<workspace_agent::Model, ApiError> {
    let resource = state.store.resource_by_id(resource_id).await?;
    let agent_id = resource.agent_id.ok_or(ApiError::NoAgent)?;
    gate::ensure_job_complete(&state.store, resource.job_id).await?;
    let agent = state.store.agent_by_id(agent_id).await?;
    Ok(agent)
}

/// Resolve and gate a listening agent before the connection is
/// upgraded.
pub async fn prepare_listen(
    state: &AppState,
    agent_id: Uuid,
) -> Result<(workspace_agent::Model, workspace_resource::Model), ApiError> {
    let agent = state.store.agent_by_id(agent_id).await?;
    let resource = state.store.resource_by_agent(agent_id).await?;
    gate::ensure_job_complete(&state.store, resource.job_id).await?;
    Ok((agent, resource))
}

/// Open a tunnel toward a resource's agent.
///
/// All lookups, the readiness gate and authorization run before the
/// upgrade so failures surface as plain HTTP statuses.
pub async fn dial_resource(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<Uuid>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let subject = Subject::from_headers(&headers);
    state
        .authorizer
        .authorize(&subject, Action::Connect, &format!("resource:{resource}"))?;

    let agent = prepare_dial(&state, resource).await?;
    debug!(%resource, agent = %agent.id, "dial connection upgrading");

    Ok(ws.on_upgrade(move |socket| run_dial(state, agent.id, socket)))
}

async fn run_dial(state: Arc<AppState>, agent_id: Uuid, socket: WebSocket) {
    let _guard = state.group.acquire();

    let (sink, source) = ws::split(socket);
    let session = match Session::establish(sink, source, SessionRole::Server).await {
        Ok(session) => session,
        Err(e) => {
            warn!(%agent_id, error = %e, "dial session handshake failed");
            return;
        }
    };

    let opts = RelayOptions::new(agent_id).with_accept_timeout(state.accept_timeout);
    if let Err(e) = relay_dial(&session, state.bus.clone(), opts).await {
        warn!(%agent_id, error = %e, "dial relay ended");
    }
    session.close();
}

/// Attach an agent as the listener for its own tunnel channel.
pub async fn agent_listen(
    State(state): State<Arc<AppState>>,
    Path(agent): Path<Uuid>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let subject = Subject::from_headers(&headers);
    state
        .authorizer
        .authorize(&subject, Action::Connect, &format!("agent:{agent}"))?;

    let (agent, resource) = prepare_listen(&state, agent).await?;
    debug!(
        agent = %agent.id,
        resource = %resource.id,
        resource_name = %resource.name,
        "listen connection upgrading"
    );

    Ok(ws.on_upgrade(move |socket| run_listen(state, agent.id, socket)))
}

async fn run_listen(state: Arc<AppState>, agent_id: Uuid, socket: WebSocket) {
    let _guard = state.group.acquire();

    let (sink, source) = ws::split(socket);
    let session = match Session::establish(sink, source, SessionRole::Server).await {
        Ok(session) => session,
        Err(e) => {
            warn!(%agent_id, error = %e, "listen session handshake failed");
            return;
        }
    };

    let mut liveness = tokio::spawn({
        let store = state.store.clone();
        let cancel = session.closed();
        async move { heartbeat(&store, agent_id, HEARTBEAT_INTERVAL, cancel).await }
    });

    tokio::select! {
        relay = relay_listen(&session, state.bus.clone(), RelayOptions::new(agent_id)) => {
            if let Err(e) = relay {
                warn!(%agent_id, error = %e, "listen relay ended");
            }
        }
        joined = &mut liveness => {
            if let Ok(Err(e)) = joined {
                warn!(%agent_id, error = %e, "liveness update failed");
                session.close_with_error(&format!("liveness update failed: {e}"));
            }
        }
    }
    session.close();
}
