//! # Server Configuration
//!
//! Router, shared state and the listener loop for the project sync API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::connectors::ClientFactory;
use crate::handlers;
use crate::scheduler::SyncScheduler;
use crate::sync_executor::SyncExecutor;
use crate::telemetry::{REQUEST_ID_HEADER, TraceContext, with_trace_context};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Request-side handle; background jobs use the executor's own
    pub db: DatabaseConnection,
    pub clients: Arc<dyn ClientFactory>,
    pub executor: SyncExecutor,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/sync/jobs/{job_id}", get(handlers::sync::get_job))
        .route("/sync/{project_id}", post(handlers::sync::trigger_full_sync))
        .route("/sync/{project_id}/jira", post(handlers::sync::enqueue_jira_sync))
        .route(
            "/sync/{project_id}/delivery",
            post(handlers::sync::enqueue_delivery_sync),
        )
        .route("/sync/{project_id}/status", get(handlers::sync::get_sync_status))
        .route("/sync/{project_id}/jobs", get(handlers::sync::list_project_jobs))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context))
        .layer(TraceLayer::new_for_http())
}

/// Scopes each request to a correlation id, taken from `x-request-id` when
/// the caller sent one.
async fn trace_context(request: Request, next: Next) -> Response {
    let supplied = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let context = TraceContext::for_request(supplied);

    with_trace_context(context, next.run(request)).await
}

/// Serves the API (and the scheduler when enabled) until `shutdown` fires.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = state.config.clone();

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = SyncScheduler::new(config.clone(), state.executor.clone());
        Some(tokio::spawn(scheduler.run(shutdown.child_token())))
    } else {
        None
    };

    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler_handle
        && let Err(err) = handle.await
    {
        tracing::warn!(error = %err, "Scheduler task ended abnormally");
    }

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::sync::trigger_full_sync,
        crate::handlers::sync::enqueue_jira_sync,
        crate::handlers::sync::enqueue_delivery_sync,
        crate::handlers::sync::get_job,
        crate::handlers::sync::get_sync_status,
        crate::handlers::sync::list_project_jobs,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::sync::SyncJobEnqueued,
            crate::sync::SyncResult,
            crate::sync::SubResult,
            crate::sync::SyncStatus,
            crate::sync::KindStatus,
            crate::sync::JobSummary,
            crate::models::sync_job::SyncJobKind,
            crate::models::sync_job::SyncJobStatus,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service metadata and health"),
        (name = "sync", description = "Project synchronization with the issue tracker and delivery system")
    ),
    info(
        title = "Project Sync API",
        description = "Mirrors issue-tracker and delivery-system data into local projects",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
