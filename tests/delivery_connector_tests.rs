//! Delivery adapter tests against a wiremock server standing in for both the
//! token endpoint and the query API.

use std::time::Duration;

use project_sync::config::DeliverySettings;
use project_sync::connectors::{DeliveryClient, IntegrationError, RemoteClient};
use project_sync::mapping::delivery_schema::{financials_query, project_query};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path, query_param},
};

const RECORD_ID: &str = "a2X5g000000AbCdEAK";
const QUERY_PATH: &str = "/services/data/v59.0/query";

fn settings(server: &MockServer) -> DeliverySettings {
    DeliverySettings {
        client_id: Some("client".to_string()),
        client_secret: Some("shh".to_string()),
        instance_url: Some(server.uri()),
        token_url: Some(format!("{}/services/oauth2/token", server.uri())),
        ..DeliverySettings::default()
    }
}

fn client(server: &MockServer) -> DeliveryClient {
    DeliveryClient::new(settings(server), Duration::from_secs(5)).unwrap()
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetches_project_with_cached_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("q", project_query(RECORD_ID)))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "records": [{
                "Id": RECORD_ID,
                "Name": "Data platform",
                "preempt__Status__c": "In Progress",
                "preempt__account__r": { "Name": "Acme" },
                "Delivery_Start_Date__c": "2025-01-06",
                "Project_Status_Pick__c": "Green",
                "Project_Risk_Level__c": "High",
                "Risk_Description__c": "Vendor is late"
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("q", financials_query(RECORD_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "records": [{
                "Id": RECORD_ID,
                "CurrencyIsoCode": "EUR",
                "FTE_Day_Price__c": 800.0,
                "Total_FTEs__c": 100,
                "Remaining_Budget__c": 30000
            }]
        })))
        .mount(&server)
        .await;

    let client = client(&server);

    let project = client.fetch_project(RECORD_ID).await.unwrap().unwrap();
    assert_eq!(project.external_id, RECORD_ID);
    assert_eq!(project.client_name.as_deref(), Some("Acme"));
    assert_eq!(project.health.overall.as_deref(), Some("Green"));
    assert!(project.embedded_risk.is_some());

    let financials = client.fetch_financials(RECORD_ID).await.unwrap();
    assert_eq!(financials.currency, "EUR");
    assert_eq!(financials.total_budget(), Some(80_000.0));
    assert_eq!(financials.spent_budget(), Some(50_000.0));
}

#[tokio::test]
async fn unauthorized_query_reauthenticates_exactly_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "stale"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_token(&server, "fresh").await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "records": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let project = client(&server).fetch_project(RECORD_ID).await.unwrap();
    assert!(project.is_none());
}

#[tokio::test]
async fn persistent_unauthorized_is_an_auth_error() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server).fetch_financials(RECORD_ID).await.unwrap_err();
    assert!(matches!(err, IntegrationError::Auth { .. }));
}

#[tokio::test]
async fn rejected_client_credentials_surface_the_description() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "invalid client credentials"
        })))
        .mount(&server)
        .await;

    let err = client(&server).fetch_project(RECORD_ID).await.unwrap_err();
    match err {
        IntegrationError::Auth { message, .. } => {
            assert_eq!(message, "invalid client credentials")
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn risk_list_follows_next_records_url() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": false,
            "nextRecordsUrl": "/services/data/v59.0/query/01gNEXT-2000",
            "records": [
                { "Id": "a3A000000000001", "Name": "Budget overrun", "Probability__c": "High" },
                { "Id": "a3A000000000002" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v59.0/query/01gNEXT-2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "records": [
                { "Id": "a3A000000000003", "Name": "Scope creep", "Status__c": "Mitigated" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.risk_object = Some("Project_Risk__c".to_string());
    let client = DeliveryClient::new(settings, Duration::from_secs(5)).unwrap();

    let risks = client.fetch_risks(RECORD_ID).await.unwrap();

    // The nameless record is dropped
    let titles: Vec<&str> = risks.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Budget overrun", "Scope creep"]);
    assert_eq!(risks[1].status.as_deref(), Some("Mitigated"));
}

#[tokio::test]
async fn unconfigured_client_never_calls_out() {
    let server = MockServer::start().await;
    let client = DeliveryClient::new(DeliverySettings::default(), Duration::from_secs(5)).unwrap();

    let err = client.fetch_project(RECORD_ID).await.unwrap_err();
    assert!(matches!(err, IntegrationError::NotConfigured { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}
