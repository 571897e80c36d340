//! Jira Cloud adapter
//!
//! Basic auth with an account email and API token against the REST v3 and
//! Agile 1.0 APIs. Searches go through `/rest/api/3/search/jql` with an
//! explicit field list and offset pagination.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::JiraSettings;
use crate::connectors::trait_::{
    ConnectionStatus, IntegrationError, RemoteClient, RemoteSystem, SprintGoal,
};
use crate::mapping::jira::{SEARCH_FIELDS, build_jql, is_valid_project_key, raw_to_issue, raw_to_project};
use crate::mapping::{RemoteIssue, RemoteProject};

const SYSTEM: RemoteSystem = RemoteSystem::Jira;
const MAX_PAGE_SIZE: usize = 100;

/// Jira adapter
pub struct JiraClient {
    settings: JiraSettings,
    http: reqwest::Client,
}

impl JiraClient {
    pub fn new(settings: JiraSettings, timeout: Duration) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))?;
        Ok(Self { settings, http })
    }

    fn base_url(&self) -> Result<&str, IntegrationError> {
        if !self.is_configured() {
            return Err(IntegrationError::NotConfigured { system: SYSTEM });
        }
        self.settings
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or(IntegrationError::NotConfigured { system: SYSTEM })
    }

    fn page_size(&self, max_results: usize) -> usize {
        max_results
            .min(self.settings.max_results)
            .clamp(1, MAX_PAGE_SIZE)
    }

    fn validate_key(key: &str) -> Result<(), IntegrationError> {
        if is_valid_project_key(key) {
            Ok(())
        } else {
            Err(IntegrationError::invalid_identifier(SYSTEM, key))
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, IntegrationError> {
        let url = format!("{}{}", self.base_url()?, path);
        self.http
            .get(&url)
            .basic_auth(
                self.settings.email.as_deref().unwrap_or_default(),
                self.settings.api_token.as_deref(),
            )
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, IntegrationError> {
        let response = check_status(self.get(path, query).await?).await?;
        response
            .json()
            .await
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))
    }

    /// Runs a JQL search, paging until `max_results` hits or a short page.
    async fn search(&self, jql: &str, max_results: usize) -> Result<Vec<Value>, IntegrationError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let page_size = self.page_size(max_results);
        let fields = SEARCH_FIELDS.join(",");
        let mut start_at = 0usize;
        let mut hits: Vec<Value> = Vec::new();

        while hits.len() < max_results {
            let body = self
                .get_json(
                    "/rest/api/3/search/jql",
                    &[
                        ("jql", jql.to_string()),
                        ("startAt", start_at.to_string()),
                        ("maxResults", page_size.to_string()),
                        ("fields", fields.clone()),
                    ],
                )
                .await?;

            let page = search_page(&body);
            let received = page.len();
            hits.extend(page.iter().cloned());

            debug!(start_at, received, total = hits.len(), "Fetched Jira search page");

            if received < page_size {
                break;
            }
            start_at += received;
        }

        hits.truncate(max_results);
        Ok(hits)
    }

    async fn first_board_id(&self, key: &str) -> Result<Option<i64>, IntegrationError> {
        let body = self
            .get_json(
                "/rest/agile/1.0/board",
                &[("projectKeyOrId", key.to_string()), ("maxResults", "50".to_string())],
            )
            .await?;

        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .and_then(|boards| boards.first())
            .and_then(|board| board.get("id"))
            .and_then(Value::as_i64))
    }

    async fn active_sprint_goal(&self, board_id: i64) -> Result<Option<String>, IntegrationError> {
        let body = self
            .get_json(
                &format!("/rest/agile/1.0/board/{board_id}/sprint"),
                &[("state", "active".to_string()), ("maxResults", "50".to_string())],
            )
            .await?;

        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .and_then(|sprints| sprints.first())
            .and_then(|sprint| sprint.get("goal"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|goal| !goal.is_empty())
            .map(str::to_string))
    }
}

/// Issues from either the flat (`issues`) or batched (`responses[0].issues`)
/// response shape.
fn search_page(body: &Value) -> &[Value] {
    body.get("responses")
        .and_then(Value::as_array)
        .and_then(|responses| responses.first())
        .and_then(|first| first.get("issues"))
        .or_else(|| body.get("issues"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

async fn check_status(response: Response) -> Result<Response, IntegrationError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IntegrationError::Auth {
            system: SYSTEM,
            message: format!("credentials rejected with HTTP {}", response.status().as_u16()),
        }),
        StatusCode::GONE => Err(IntegrationError::Deprecated {
            system: SYSTEM,
            message: "search endpoint removed; /rest/api/3/search/jql is required".to_string(),
        }),
        _ => Err(IntegrationError::from_response(SYSTEM, response).await),
    }
}

#[async_trait]
impl RemoteClient for JiraClient {
    fn system(&self) -> RemoteSystem {
        SYSTEM
    }

    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    async fn fetch_project(&self, key: &str) -> Result<Option<RemoteProject>, IntegrationError> {
        Self::validate_key(key)?;

        let response = self.get(&format!("/rest/api/3/project/{key}"), &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(project_key = %key, "Jira project not found");
            return Ok(None);
        }

        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))?;

        raw_to_project(&body).map(Some).ok_or_else(|| IntegrationError::InvalidResponse {
            system: SYSTEM,
            message: "project response has no key".to_string(),
        })
    }

    async fn fetch_issues(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
        max_results: usize,
    ) -> Result<Vec<RemoteIssue>, IntegrationError> {
        Self::validate_key(key)?;

        let jql = build_jql(key, since, Utc::now());
        info!(project_key = %key, incremental = since.is_some(), "Searching Jira issues");

        let hits = self.search(&jql, max_results).await?;
        let issues: Vec<RemoteIssue> = hits.iter().filter_map(raw_to_issue).collect();
        if issues.len() < hits.len() {
            warn!(
                project_key = %key,
                dropped = hits.len() - issues.len(),
                "Dropped Jira search hits without an issue key"
            );
        }
        Ok(issues)
    }

    async fn fetch_sprint_goal(&self, key: &str) -> Result<Option<SprintGoal>, IntegrationError> {
        Self::validate_key(key)?;

        let Some(board_id) = self.first_board_id(key).await? else {
            return Ok(None);
        };
        let goal = self.active_sprint_goal(board_id).await?;
        Ok(Some(SprintGoal { board_id, goal }))
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let result = async {
            let body = self.get_json("/rest/api/3/myself", &[]).await?;
            Ok::<_, IntegrationError>(
                body.get("displayName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            )
        }
        .await;

        match result {
            Ok(identity) => ConnectionStatus::connected(SYSTEM, identity),
            Err(err) => ConnectionStatus::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: Option<&str>) -> JiraSettings {
        JiraSettings {
            base_url: base_url.map(str::to_string),
            email: Some("bot@example.com".to_string()),
            api_token: Some("token".to_string()),
            max_results: 100,
            fetch_sprint_goal: true,
        }
    }

    #[test]
    fn page_size_is_capped() {
        let client = JiraClient::new(settings(Some("https://x")), Duration::from_secs(5)).unwrap();
        assert_eq!(client.page_size(500), 100);
        assert_eq!(client.page_size(20), 20);
    }

    #[test]
    fn reads_batched_search_shape() {
        let body = serde_json::json!({ "responses": [{ "issues": [{ "key": "A-1" }] }] });
        assert_eq!(search_page(&body).len(), 1);

        let flat = serde_json::json!({ "issues": [{ "key": "A-1" }, { "key": "A-2" }] });
        assert_eq!(search_page(&flat).len(), 2);

        assert!(search_page(&serde_json::json!({})).is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_calls() {
        let client = JiraClient::new(settings(None), Duration::from_secs(5)).unwrap();
        let err = client.fetch_issues("OPS", None, 10).await.unwrap_err();
        assert_eq!(err, IntegrationError::NotConfigured { system: SYSTEM });
    }

    #[tokio::test]
    async fn invalid_key_is_rejected_before_any_request() {
        let client = JiraClient::new(settings(Some("http://127.0.0.1:9")), Duration::from_secs(5))
            .unwrap();
        let err = client.fetch_issues("ops\"", None, 10).await.unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidIdentifier { .. }));
    }
}
