//! Remote client trait definition
//!
//! Defines the uniform surface both remote adapters implement and the single
//! typed error they are allowed to return.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::mapping::{RemoteFinancials, RemoteIssue, RemoteProject, RemoteRisk};

/// The external systems-of-record the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RemoteSystem {
    /// Issue tracker
    Jira,
    /// CRM-based delivery management (Salesforce + Precursive)
    Delivery,
}

impl RemoteSystem {
    pub const fn as_str(self) -> &'static str {
        match self {
            RemoteSystem::Jira => "jira",
            RemoteSystem::Delivery => "delivery",
        }
    }
}

impl fmt::Display for RemoteSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure an adapter can surface. Transport errors from `reqwest`
/// are converted at the adapter boundary and never leak past it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("{system} integration is not configured")]
    NotConfigured { system: RemoteSystem },
    #[error("{system} returned HTTP {status}: {message}")]
    Http {
        system: RemoteSystem,
        status: u16,
        message: String,
    },
    #[error("{system} authentication failed: {message}")]
    Auth {
        system: RemoteSystem,
        message: String,
    },
    #[error("{system} request failed: {message}")]
    Transport {
        system: RemoteSystem,
        message: String,
    },
    #[error("{system} returned an unexpected response: {message}")]
    InvalidResponse {
        system: RemoteSystem,
        message: String,
    },
    #[error("invalid {system} identifier '{value}'")]
    InvalidIdentifier { system: RemoteSystem, value: String },
    #[error("{system} endpoint is no longer available: {message}")]
    Deprecated {
        system: RemoteSystem,
        message: String,
    },
}

impl IntegrationError {
    pub fn system(&self) -> RemoteSystem {
        match self {
            IntegrationError::NotConfigured { system }
            | IntegrationError::Http { system, .. }
            | IntegrationError::Auth { system, .. }
            | IntegrationError::Transport { system, .. }
            | IntegrationError::InvalidResponse { system, .. }
            | IntegrationError::InvalidIdentifier { system, .. }
            | IntegrationError::Deprecated { system, .. } => *system,
        }
    }

    /// Wraps a `reqwest` failure, distinguishing timeouts and undecodable bodies.
    pub fn from_reqwest(system: RemoteSystem, error: reqwest::Error) -> Self {
        if error.is_decode() {
            IntegrationError::InvalidResponse {
                system,
                message: error.to_string(),
            }
        } else if error.is_timeout() {
            IntegrationError::Transport {
                system,
                message: format!("request timed out: {error}"),
            }
        } else {
            IntegrationError::Transport {
                system,
                message: error.to_string(),
            }
        }
    }

    /// Builds an `Http` error from a non-success response, keeping a bounded
    /// slice of the body as the message.
    pub async fn from_response(system: RemoteSystem, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        IntegrationError::Http {
            system,
            status,
            message: truncate(&body, 500),
        }
    }

    /// Truncated copy of a caller-supplied identifier for error messages.
    pub fn invalid_identifier(system: RemoteSystem, value: &str) -> Self {
        IntegrationError::InvalidIdentifier {
            system,
            value: truncate(value, 20),
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConnectionStatus {
    pub system: RemoteSystem,
    pub connected: bool,
    /// Account or instance the credentials resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected(system: RemoteSystem, identity: Option<String>) -> Self {
        Self {
            system,
            connected: true,
            identity,
            error: None,
        }
    }

    pub fn failed(error: &IntegrationError) -> Self {
        Self {
            system: error.system(),
            connected: false,
            identity: None,
            error: Some(error.to_string()),
        }
    }
}

/// Active iteration goal looked up for a project's first board.
#[derive(Debug, Clone, PartialEq)]
pub struct SprintGoal {
    pub board_id: i64,
    pub goal: Option<String>,
}

/// Uniform fetch surface over one remote system.
///
/// Operations a system has no notion of (issues on the delivery side,
/// financials on the tracker side) keep their empty default.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    fn system(&self) -> RemoteSystem;

    /// True when every credential the adapter needs is present.
    fn is_configured(&self) -> bool;

    /// Looks up the project by tracker key or delivery record id.
    async fn fetch_project(&self, key: &str) -> Result<Option<RemoteProject>, IntegrationError>;

    /// Issues for `key`, newest first, optionally only those updated since
    /// `since`. Stops after `max_results` issues or a short page.
    async fn fetch_issues(
        &self,
        _key: &str,
        _since: Option<DateTime<Utc>>,
        _max_results: usize,
    ) -> Result<Vec<RemoteIssue>, IntegrationError> {
        Ok(Vec::new())
    }

    async fn fetch_financials(&self, id: &str) -> Result<RemoteFinancials, IntegrationError> {
        Ok(RemoteFinancials::empty(id))
    }

    async fn fetch_risks(&self, _id: &str) -> Result<Vec<RemoteRisk>, IntegrationError> {
        Ok(Vec::new())
    }

    /// Goal of the active iteration on the project's first board, if any.
    async fn fetch_sprint_goal(&self, _key: &str) -> Result<Option<SprintGoal>, IntegrationError> {
        Ok(None)
    }

    async fn test_connection(&self) -> ConnectionStatus;

    /// Drops cached tokens; called once at the end of each orchestration run.
    async fn close(&self) {}
}
