//! # Error Handling
//!
//! Domain errors for the sync subsystem plus the problem+json [`ApiError`]
//! returned by HTTP handlers, with trace ID propagation.

use axum::{
    extract::rejection::PathRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::connectors::IntegrationError;
use crate::models::sync_job::SyncJobStatus;
use crate::telemetry;

/// Errors raised by the orchestrator and the job ledger.
///
/// Only `ProjectNotFound`, `JobNotFound` and `Database` abort a whole
/// operation; integration and validation failures are normally folded into a
/// sub-result by the orchestrator instead of being returned.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("sync job {0} not found")]
    JobNotFound(Uuid),
    #[error("sync job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: SyncJobStatus,
        to: SyncJobStatus,
    },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract the active trace ID (falls back to a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Detects unique-constraint violations across Postgres and SQLite.
pub fn is_unique_violation(error: &DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code: &str = code.as_ref();
        code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code)
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::ProjectNotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Project {} not found", id),
            ),
            SyncError::JobNotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Sync job {} not found", id),
            ),
            SyncError::InvalidTransition { job_id, from, to } => Self::new(
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                &format!("Sync job {} cannot move from {} to {}", job_id, from, to),
            ),
            SyncError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
            }
            SyncError::Integration(err) => err.into(),
            SyncError::Database(err) => err.into(),
        }
    }
}

impl From<IntegrationError> for ApiError {
    fn from(error: IntegrationError) -> Self {
        match &error {
            IntegrationError::NotConfigured { system } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "NOT_CONFIGURED",
                &format!("{} integration is not configured", system),
            ),
            IntegrationError::InvalidIdentifier { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &error.to_string(),
            ),
            IntegrationError::Http { system, status, .. } => Self::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &error.to_string(),
            )
            .with_details(json!({ "system": system.as_str(), "status": status })),
            _ => Self::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &error.to_string(),
            ),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("Invalid path parameter: {}", rejection.body_text()),
        )
    }
}

impl From<DbErr> for ApiError {
    fn from(error: DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::RemoteSystem;

    #[test]
    fn project_not_found_maps_to_404() {
        let id = Uuid::new_v4();
        let api_error: ApiError = SyncError::ProjectNotFound(id).into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
        assert!(api_error.message.contains(&id.to_string()));
    }

    #[test]
    fn invalid_transition_maps_to_conflict() {
        let api_error: ApiError = SyncError::InvalidTransition {
            job_id: Uuid::new_v4(),
            from: SyncJobStatus::Succeeded,
            to: SyncJobStatus::Running,
        }
        .into();

        assert_eq!(api_error.status, StatusCode::CONFLICT);
        assert!(api_error.message.contains("succeeded"));
        assert!(api_error.message.contains("running"));
    }

    #[test]
    fn upstream_http_error_maps_to_bad_gateway_with_details() {
        let api_error: ApiError = SyncError::Integration(IntegrationError::Http {
            system: RemoteSystem::Jira,
            status: 503,
            message: "unavailable".to_string(),
        })
        .into();

        assert_eq!(api_error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api_error.code, Box::from("PROVIDER_ERROR"));
        let details = api_error.details.unwrap();
        assert_eq!(details["status"], 503);
        assert_eq!(details["system"], "jira");
    }

    #[test]
    fn not_configured_is_not_a_gateway_error() {
        let api_error: ApiError = IntegrationError::NotConfigured {
            system: RemoteSystem::Delivery,
        }
        .into();

        assert_eq!(api_error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api_error.code, Box::from("NOT_CONFIGURED"));
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let api_error: ApiError = DbErr::RecordNotFound("sync_jobs".to_string()).into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("sync_jobs"));
    }

    #[test]
    fn responses_use_problem_json() {
        let response =
            ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "bad").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn generated_trace_id_has_correlation_prefix() {
        let error = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "X", "y");
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }
}
