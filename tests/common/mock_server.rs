//! Mock server helpers for integration tests
//!
//! A `wiremock` server standing in for the remote form sync endpoint.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock endpoint listens on
pub const SYNC_PATH: &str = "/api/forms/sync";

/// Mock sync server answering every push with `status`
pub async fn sync_server(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SYNC_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// Full endpoint URL on `server`
pub fn sync_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), SYNC_PATH)
}

/// Bodies of every push the server received
pub async fn received_payloads(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
