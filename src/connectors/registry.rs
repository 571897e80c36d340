//! Client factory
//!
//! Builds a fresh pair of adapters for each orchestration run so token state
//! and HTTP connections never outlive the run that created them.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::AppConfig;
use crate::connectors::delivery::DeliveryClient;
use crate::connectors::jira::JiraClient;
use crate::connectors::trait_::{IntegrationError, RemoteClient};

/// The adapters one orchestration run works with.
#[derive(Clone)]
pub struct RemoteClients {
    pub jira: Arc<dyn RemoteClient>,
    pub delivery: Arc<dyn RemoteClient>,
}

impl RemoteClients {
    pub fn new(jira: Arc<dyn RemoteClient>, delivery: Arc<dyn RemoteClient>) -> Self {
        Self { jira, delivery }
    }

    /// Releases both adapters' cached credentials.
    pub async fn close(&self) {
        self.jira.close().await;
        self.delivery.close().await;
    }
}

/// Source of per-run adapters.
pub trait ClientFactory: Send + Sync {
    fn create(&self) -> Result<RemoteClients, IntegrationError>;
}

/// Builds real HTTP adapters from configuration.
pub struct HttpClientFactory {
    config: Arc<AppConfig>,
}

impl HttpClientFactory {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self) -> Result<RemoteClients, IntegrationError> {
        let timeout = Duration::from_secs(self.config.sync.http_timeout_seconds);
        let jira = JiraClient::new(self.config.jira.clone(), timeout)?;
        let delivery = DeliveryClient::new(self.config.delivery.clone(), timeout)?;

        debug!(
            jira_configured = jira.is_configured(),
            delivery_configured = delivery.is_configured(),
            timeout_secs = timeout.as_secs(),
            "Created remote clients"
        );

        Ok(RemoteClients::new(Arc::new(jira), Arc::new(delivery)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::trait_::RemoteSystem;

    #[test]
    fn factory_builds_unconfigured_clients_from_defaults() {
        let factory = HttpClientFactory::new(Arc::new(AppConfig::default()));
        let clients = factory.create().unwrap();

        assert_eq!(clients.jira.system(), RemoteSystem::Jira);
        assert_eq!(clients.delivery.system(), RemoteSystem::Delivery);
        assert!(!clients.jira.is_configured());
        assert!(!clients.delivery.is_configured());
    }
}
