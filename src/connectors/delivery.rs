//! Salesforce / Precursive delivery adapter
//!
//! OAuth client-credentials against a login host derived from the configured
//! instance, then SOQL queries against the project object. Record ids are
//! validated before they are interpolated into any query.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DeliverySettings;
use crate::connectors::token::{AccessToken, TokenCache};
use crate::connectors::trait_::{ConnectionStatus, IntegrationError, RemoteClient, RemoteSystem};
use crate::mapping::delivery::{is_valid_record_id, raw_to_financials, raw_to_project, raw_to_risk};
use crate::mapping::delivery_schema::{financials_query, project_query, risk_list_query};
use crate::mapping::{RemoteFinancials, RemoteProject, RemoteRisk};

const SYSTEM: RemoteSystem = RemoteSystem::Delivery;
const DEFAULT_LOGIN_HOST: &str = "login.salesforce.com";
const TOKEN_PATH: &str = "/services/oauth2/token";
const MAX_TOKEN_TTL_SECONDS: u64 = 86_400;

static SOBJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("sobject name pattern compiles")
});

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    instance_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token endpoint for an instance URL.
///
/// `acme.lightning.force.com` authenticates at `acme.my.salesforce.com`,
/// `*.my.salesforce.com` at itself, anything else at the generic login host.
pub fn token_url_for(instance_url: &str) -> String {
    let host = Url::parse(instance_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string));

    let login_host = match host.as_deref() {
        Some(host) if host.ends_with(".lightning.force.com") => {
            let domain = host.split('.').next().unwrap_or(host);
            format!("{domain}.my.salesforce.com")
        }
        Some(host) if host.ends_with(".my.salesforce.com") => host.to_string(),
        _ => DEFAULT_LOGIN_HOST.to_string(),
    };

    format!("https://{login_host}{TOKEN_PATH}")
}

/// Delivery adapter
pub struct DeliveryClient {
    settings: DeliverySettings,
    http: reqwest::Client,
    tokens: Mutex<TokenCache>,
}

impl DeliveryClient {
    pub fn new(settings: DeliverySettings, timeout: Duration) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))?;
        Ok(Self {
            settings,
            http,
            tokens: Mutex::new(TokenCache::default()),
        })
    }

    fn ensure_configured(&self) -> Result<(), IntegrationError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(IntegrationError::NotConfigured { system: SYSTEM })
        }
    }

    fn validate_id(id: &str) -> Result<(), IntegrationError> {
        if is_valid_record_id(id) {
            Ok(())
        } else {
            Err(IntegrationError::invalid_identifier(SYSTEM, id))
        }
    }

    fn token_url(&self) -> String {
        match self.settings.token_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => url.to_string(),
            None => token_url_for(self.settings.instance_url.as_deref().unwrap_or_default()),
        }
    }

    fn api_base<'a>(&'a self, token: &'a AccessToken) -> &'a str {
        token
            .instance_url
            .as_deref()
            .or(self.settings.instance_url.as_deref())
            .unwrap_or_default()
            .trim_end_matches('/')
    }

    async fn authenticate(&self) -> Result<AccessToken, IntegrationError> {
        let token_url = self.token_url();
        info!(token_url = %token_url, "Authenticating with delivery system");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.settings.client_id.as_deref().unwrap_or_default()),
            (
                "client_secret",
                self.settings.client_secret.as_deref().unwrap_or_default(),
            ),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&form)
            .send()
            .await
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .and_then(|err| err.error_description.or(err.error))
                .unwrap_or(body);
            return Err(IntegrationError::Auth {
                system: SYSTEM,
                message,
            });
        }
        if !status.is_success() {
            return Err(IntegrationError::from_response(SYSTEM, response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))?;

        let ttl = chrono::Duration::seconds(self.settings.token_ttl_seconds.min(MAX_TOKEN_TTL_SECONDS) as i64);
        debug!(instance_url = ?token.instance_url, "Delivery token issued");

        Ok(AccessToken {
            value: token.access_token,
            instance_url: token.instance_url,
            expires_at: Utc::now() + ttl,
        })
    }

    /// Cached token, authenticating first when none is valid.
    async fn access_token(&self) -> Result<AccessToken, IntegrationError> {
        let mut cache = self.tokens.lock().await;
        if let Some(token) = cache.current() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        cache.store(token.clone());
        Ok(token)
    }

    /// Replaces a token the remote side rejected. If another caller already
    /// refreshed it while we waited for the lock, that token is reused.
    async fn refresh_token(&self, rejected: &str) -> Result<AccessToken, IntegrationError> {
        let mut cache = self.tokens.lock().await;
        if let Some(token) = cache.current()
            && token.value != rejected
        {
            return Ok(token.clone());
        }
        cache.invalidate();
        let token = self.authenticate().await?;
        cache.store(token.clone());
        Ok(token)
    }

    async fn send_get(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, IntegrationError> {
        let url = format!("{}{}", self.api_base(token), path);
        self.http
            .get(&url)
            .bearer_auth(&token.value)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err))
    }

    /// GET with one re-authentication on 401.
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, IntegrationError> {
        let mut token = self.access_token().await?;
        let mut response = self.send_get(&token, path, query).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %path, "Delivery token rejected, re-authenticating once");
            token = self.refresh_token(&token.value).await?;
            response = self.send_get(&token, path, query).await?;
        }

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|err| IntegrationError::from_reqwest(SYSTEM, err)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IntegrationError::Auth {
                system: SYSTEM,
                message: format!("request rejected with HTTP {}", response.status().as_u16()),
            }),
            _ => Err(IntegrationError::from_response(SYSTEM, response).await),
        }
    }

    /// Runs a SOQL query, following `nextRecordsUrl` until `done`.
    async fn query(&self, soql: &str) -> Result<Vec<Value>, IntegrationError> {
        self.ensure_configured()?;

        let query_path = format!("/services/data/{}/query", self.settings.api_version);
        let mut body = self.get_json(&query_path, &[("q", soql)]).await?;
        let mut records = Vec::new();

        loop {
            let page = body
                .get("records")
                .and_then(Value::as_array)
                .ok_or_else(|| IntegrationError::InvalidResponse {
                    system: SYSTEM,
                    message: "query response has no records array".to_string(),
                })?;
            records.extend(page.iter().cloned());

            let done = body.get("done").and_then(Value::as_bool).unwrap_or(true);
            let next = body
                .get("nextRecordsUrl")
                .and_then(Value::as_str)
                .map(str::to_string);

            match next {
                Some(next) if !done => {
                    debug!(fetched = records.len(), "Following delivery query cursor");
                    body = self.get_json(&next, &[]).await?;
                }
                _ => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl RemoteClient for DeliveryClient {
    fn system(&self) -> RemoteSystem {
        SYSTEM
    }

    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    async fn fetch_project(&self, id: &str) -> Result<Option<RemoteProject>, IntegrationError> {
        Self::validate_id(id)?;

        let records = self.query(&project_query(id)).await?;
        let Some(record) = records.first() else {
            warn!(record_id = %id, "Delivery project not found");
            return Ok(None);
        };

        raw_to_project(record)
            .map(Some)
            .ok_or_else(|| IntegrationError::InvalidResponse {
                system: SYSTEM,
                message: "project record has no Id".to_string(),
            })
    }

    async fn fetch_financials(&self, id: &str) -> Result<RemoteFinancials, IntegrationError> {
        Self::validate_id(id)?;

        let records = self.query(&financials_query(id)).await?;
        let financials = match records.first() {
            Some(record) => raw_to_financials(id, record),
            None => RemoteFinancials::empty(id),
        };

        debug!(
            record_id = %id,
            has_any_data = financials.has_any_data(),
            total_budget = ?financials.total_budget(),
            remaining_budget = ?financials.remaining_budget,
            "Fetched delivery financials"
        );

        Ok(financials)
    }

    async fn fetch_risks(&self, id: &str) -> Result<Vec<RemoteRisk>, IntegrationError> {
        Self::validate_id(id)?;

        // Without a risk object the only risk data is embedded on the project record.
        let Some(sobject) = self.settings.risk_object.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(Vec::new());
        };
        if !SOBJECT_NAME.is_match(sobject) {
            return Err(IntegrationError::invalid_identifier(SYSTEM, sobject));
        }

        let records = self.query(&risk_list_query(sobject, id)).await?;
        Ok(records.iter().filter_map(raw_to_risk).collect())
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let result = async {
            self.ensure_configured()?;
            self.get_json(&format!("/services/data/{}/", self.settings.api_version), &[])
                .await?;
            let token = self.access_token().await?;
            Ok::<_, IntegrationError>(Some(self.api_base(&token).to_string()))
        }
        .await;

        match result {
            Ok(identity) => ConnectionStatus::connected(SYSTEM, identity),
            Err(err) => ConnectionStatus::failed(&err),
        }
    }

    async fn close(&self) {
        self.tokens.lock().await.invalidate();
    }
}
