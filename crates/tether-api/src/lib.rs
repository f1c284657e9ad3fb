pub mod handlers;
pub mod models;
pub mod rbac;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tether_broker::{ConnectionGroup, DEFAULT_ACCEPT_TIMEOUT};
use tether_bus::Pubsub;
use tether_db::Store;

use rbac::SharedAuthorizer;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub bus: Arc<dyn Pubsub>,
    pub authorizer: SharedAuthorizer,
    pub group: ConnectionGroup,
    pub accept_timeout: Duration,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tether API",
        version = "0.1.0",
        description = "REST and WebSocket API for brokering tunnels to workspace agents",
        contact(
            name = "Tether Team",
            email = "team@tether.dev"
        )
    ),
    paths(
        handlers::health_check,
        handlers::get_resource,
    ),
    components(
        schemas(
            models::ResourceView,
            models::AgentView,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    tags(
        (name = "resources", description = "Provisioned resource endpoints"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (for development)
    pub enable_cors: bool,
    /// How long a dial waits for a listener acknowledgement
    pub accept_timeout: Duration,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        store: Store,
        bus: Arc<dyn Pubsub>,
        authorizer: SharedAuthorizer,
        group: ConnectionGroup,
    ) -> Self {
        let state = Arc::new(AppState {
            store,
            bus,
            authorizer,
            group,
            accept_timeout: config.accept_timeout,
        });

        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        let api_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route(
                "/api/builds/{build}/resources/{resource}",
                get(handlers::get_resource),
            )
            .route("/api/resources/{resource}/dial", get(handlers::dial_resource))
            .route("/api/agents/{agent}/listen", get(handlers::agent_listen))
            .with_state(self.state.clone());

        // SwaggerUi automatically creates a route for /api/openapi.json
        let router = Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", api_doc))
            .merge(api_router);

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_methods([Method::GET])
                    .allow_headers(Any)
                    .allow_origin(Any),
            );
        }

        router
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
