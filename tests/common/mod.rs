#![allow(dead_code)]

use once_cell::sync::Lazy;
use piwik_pro_mcp::config::{Config, Credentials};
use piwik_pro_mcp::services::api_client::ApiClient;
use piwik_pro_mcp::services::logger::Logger;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";
pub const WEBSITE_ID: &str = "8a5b6c4e-1111-2222-3333-444455556666";

pub fn token_response(token: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token_type": "Bearer",
        "access_token": token,
        "expires_in": expires_in,
    }))
}

/// Token endpoint that hands out `token` valid for an hour.
pub async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(token_response(token, 3600))
        .mount(server)
        .await;
}

pub fn test_config(server: &MockServer) -> Config {
    let credentials = Credentials::new(&server.uri(), CLIENT_ID, CLIENT_SECRET)
        .expect("mock server uri is a valid host");
    let mut config = Config::new(credentials);
    config.timeout_ms = 2_000;
    config
}

pub fn test_client(server: &MockServer) -> ApiClient {
    ApiClient::new(Logger::new("test"), &test_config(server)).expect("client builds")
}

pub fn short_timeout_client(server: &MockServer, timeout: Duration) -> ApiClient {
    let mut config = test_config(server);
    config.timeout_ms = timeout.as_millis() as u64;
    ApiClient::new(Logger::new("test"), &config).expect("client builds")
}

pub async fn requests_to(server: &MockServer, wanted: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == wanted)
        .collect()
}
