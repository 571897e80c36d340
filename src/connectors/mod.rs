//! Connectors module
//!
//! Remote client adapters for the issue tracker and the delivery system:
//! - The `RemoteClient` trait and the `IntegrationError` every adapter returns
//! - Per-adapter token caching
//! - The factory that builds a fresh adapter pair per orchestration run

pub mod delivery;
pub mod jira;
pub mod registry;
pub mod token;
pub mod trait_;

pub use delivery::DeliveryClient;
pub use jira::JiraClient;
pub use registry::{ClientFactory, HttpClientFactory, RemoteClients};
pub use token::{AccessToken, TokenCache};
pub use trait_::{ConnectionStatus, IntegrationError, RemoteClient, RemoteSystem, SprintGoal};
