//! Authenticated HTTP client for the Piwik PRO REST API.
//!
//! Every call obtains a token from the [`TokenManager`], attaches it as a
//! bearer credential and classifies failures into [`ApiError`]. The only
//! automatic retry is a single forced re-authentication after the upstream
//! rejects a token.

use crate::config::Config;
use crate::constants::{media, network};
use crate::errors::{parse_retry_after, ApiError, ToolError};
use crate::services::logger::Logger;
use crate::services::token_manager::TokenManager;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One outbound call. Built per request and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, query: Option<&Value>) -> Self {
        if let Some(query) = query {
            self.query.extend(query_pairs(query));
        }
        self
    }

    pub fn with_body(mut self, body: Option<&Value>) -> Self {
        self.body = body.cloned();
        self
    }
}

pub struct ApiClient {
    logger: Logger,
    http: Client,
    base_url: String,
    tokens: Arc<TokenManager>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(logger: Logger, config: &Config) -> Result<Self, ToolError> {
        let http = Client::builder()
            .user_agent(network::USER_AGENT)
            .connect_timeout(Duration::from_millis(network::TIMEOUT_CONNECTION_MS))
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let tokens = Arc::new(TokenManager::new(
            logger.clone(),
            http.clone(),
            config.credentials.clone(),
            Duration::from_secs(config.token_skew_secs),
            timeout,
        ));
        Ok(Self {
            logger: logger.child("api"),
            http,
            base_url: config.credentials.host().to_string(),
            tokens,
            timeout,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue an authenticated request. `Ok(None)` means the upstream answered
    /// without content (204 or an empty body).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&Value>,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let request = ApiRequest::new(method, path)
            .with_query(query)
            .with_body(body);
        self.execute(&request).await
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<Option<Value>, ApiError> {
        let url = resolve_url(&self.base_url, &request.path)?;
        let token = self.tokens.access_token().await?;
        match self.send_once(request, &url, &token).await {
            Err(err) if err.is_authentication() => {
                self.logger.warn(
                    "request rejected as unauthenticated, refreshing token once",
                    Some(&serde_json::json!({
                        "method": request.method.as_str(),
                        "path": request.path,
                        "status": err.status,
                    })),
                );
                let fresh = self.tokens.force_refresh(&token).await?;
                self.send_once(request, &url, &fresh).await
            }
            other => other,
        }
    }

    pub async fn get(&self, path: &str, query: Option<&Value>) -> Result<Option<Value>, ApiError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::POST, path, None, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::PATCH, path, None, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::PUT, path, None, Some(body)).await
    }

    pub async fn delete(
        &self,
        path: &str,
        query: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        self.request(Method::DELETE, path, query, None).await
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        url: &str,
        token: &str,
    ) -> Result<Option<Value>, ApiError> {
        let started = Instant::now();
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .bearer_auth(token)
            .header(ACCEPT, media::ACCEPT)
            .timeout(self.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body).map_err(|err| {
                ApiError::bad_request(format!("Request body is not serializable: {}", err))
            })?;
            builder = builder.header(CONTENT_TYPE, media::JSON_API).body(bytes);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let err = ApiError::from_reqwest(err);
                self.logger.warn(
                    "request failed before a response",
                    Some(&serde_json::json!({
                        "method": request.method.as_str(),
                        "path": request.path,
                        "error": err.message,
                    })),
                );
                return Err(err);
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase());
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let text = response.text().await.map_err(ApiError::from_reqwest)?;

        self.logger.debug(
            "request completed",
            Some(&serde_json::json!({
                "method": request.method.as_str(),
                "path": request.path,
                "status": status.as_u16(),
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &text, retry_after));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        if let Some(content_type) = content_type.as_deref() {
            if !content_type.contains("json") {
                return Err(ApiError::unexpected_response(format!(
                    "Expected a JSON response, got '{}'",
                    content_type
                ))
                .with_status(status.as_u16()));
            }
        }
        serde_json::from_str(&text).map(Some).map_err(|err| {
            ApiError::unexpected_response(format!("Response body is not valid JSON: {}", err))
                .with_status(status.as_u16())
        })
    }
}

fn resolve_url(base_url: &str, path: &str) -> Result<String, ApiError> {
    let path = path.trim();
    if has_scheme(path) {
        return Err(ApiError::bad_request(format!(
            "Request path must be server-relative, got '{}'",
            path
        )));
    }
    if path.starts_with('/') {
        Ok(format!("{}{}", base_url, path))
    } else {
        Ok(format!("{}/{}", base_url, path))
    }
}

/// True when `path` starts with a URI scheme such as `https:`. A `://` later
/// in the query or fragment does not count.
fn has_scheme(path: &str) -> bool {
    let Some((scheme, _)) = path.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Flatten a JSON object into query pairs. Arrays become repeated keys and
/// nulls are skipped.
pub fn query_pairs(query: &Value) -> Vec<(String, String)> {
    let Some(map) = query.as_object() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(rendered) = render_scalar(item) {
                        out.push((key.clone(), rendered));
                    }
                }
            }
            other => {
                if let Some(rendered) = render_scalar(other) {
                    out.push((key.clone(), rendered));
                }
            }
        }
    }
    out
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_repeat_array_values() {
        let pairs = query_pairs(&serde_json::json!({
            "website_id": "w-1",
            "date_from": ["2024-01-01", "2024-02-01"],
            "limit": 10,
            "offset": null,
        }));
        assert!(pairs.contains(&("website_id".to_string(), "w-1".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "10".to_string())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "date_from").count(), 2);
        assert!(!pairs.iter().any(|(k, _)| k == "offset"));
    }

    #[test]
    fn resolve_url_rejects_absolute_urls() {
        let err = resolve_url("https://acme.piwik.pro", "https://evil.example/x").unwrap_err();
        assert_eq!(err.kind, crate::errors::ApiErrorKind::BadRequest);
        assert_eq!(
            resolve_url("https://acme.piwik.pro", "api/apps/v2").unwrap(),
            "https://acme.piwik.pro/api/apps/v2"
        );
    }

    #[test]
    fn resolve_url_allows_urls_inside_the_query() {
        assert_eq!(
            resolve_url("https://acme.piwik.pro", "/api/x?next=http://a").unwrap(),
            "https://acme.piwik.pro/api/x?next=http://a"
        );
        assert!(resolve_url("https://acme.piwik.pro", "mailto:someone@example.com").is_err());
        assert!(resolve_url("https://acme.piwik.pro", "api/v2:batch").is_ok());
    }
}
