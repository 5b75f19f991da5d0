mod common;

use common::{mount_token, requests_to, short_timeout_client, test_client};
use piwik_pro_mcp::errors::ApiErrorKind;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_sends_bearer_token_and_returns_json() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/api/apps/v2"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [], "meta": {"total": 0}})))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let body = api.get("/api/apps/v2", None).await.expect("ok");
    assert_eq!(body, Some(json!({"data": [], "meta": {"total": 0}})));
}

#[tokio::test]
async fn array_query_values_become_repeated_keys() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/api/analytics/v1/manage/annotation/user/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let api = test_client(&server);
    api.get(
        "/api/analytics/v1/manage/annotation/user/",
        Some(&json!({"website_id": "w-1", "date_from": ["2024-01-01", "2024-02-01"]})),
    )
    .await
    .expect("ok");

    let requests = requests_to(&server, "/api/analytics/v1/manage/annotation/user/").await;
    assert_eq!(requests.len(), 1);
    let dates: Vec<String> = requests[0]
        .url
        .query_pairs()
        .filter(|(key, _)| key == "date_from")
        .map(|(_, value)| value.into_owned())
        .collect();
    assert_eq!(dates, vec!["2024-01-01", "2024-02-01"]);
}

#[tokio::test]
async fn write_requests_use_json_api_content_type() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/api/apps/v2"))
        .and(header("content-type", "application/vnd.api+json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "a-1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let created = api
        .post("/api/apps/v2", &json!({"data": {"type": "ppms/app", "attributes": {}}}))
        .await
        .expect("created");
    assert_eq!(created.unwrap()["data"]["id"], "a-1");
}

#[tokio::test]
async fn no_content_is_none() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("DELETE"))
        .and(path("/api/apps/v2/a-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let api = test_client(&server);
    assert_eq!(api.delete("/api/apps/v2/a-1", None).await.expect("ok"), None);
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/invalid"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"detail": "name is too long", "source": {"pointer": "/data/attributes/name"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conflict"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let api = test_client(&server);

    let err = api.get("/missing", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::NotFound);
    assert_eq!(err.status, Some(404));

    let err = api.get("/invalid", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::BadRequest);
    assert_eq!(err.message, "name is too long (/data/attributes/name)");
    assert!(err.payload.is_some());

    let err = api.get("/conflict", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Conflict);

    let err = api.get("/busy", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::RateLimit);
    assert_eq!(err.retry_after, Some(12));

    let err = api.get("/broken", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Server);
    assert!(err.message.contains("bad gateway"));
}

#[tokio::test]
async fn non_json_success_is_unexpected_response() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html></html>"),
        )
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = api.get("/html", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::UnexpectedResponse);
}

#[tokio::test]
async fn slow_upstream_times_out_as_transport_error() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(1_500)),
        )
        .mount(&server)
        .await;

    let api = short_timeout_client(&server, Duration::from_millis(200));
    let err = api.get("/slow", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Transport);
    assert!(err.timed_out);
}

#[tokio::test]
async fn absolute_urls_are_refused_before_any_request() {
    let server = MockServer::start().await;
    let api = test_client(&server);
    let err = api.get("https://elsewhere.example/api", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::BadRequest);
    assert!(err.status.is_none());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn single_unauthorized_response_refreshes_and_retries_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/api/apps/v2/a-1"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/apps/v2/a-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "a-1"}})))
        .mount(&server)
        .await;

    let api = test_client(&server);
    let found = api.get("/api/apps/v2/a-1", None).await.expect("retried");
    assert_eq!(found.unwrap()["data"]["id"], "a-1");
    assert_eq!(api.tokens().exchange_count(), 2);
    assert_eq!(requests_to(&server, "/api/apps/v2/a-1").await.len(), 2);
}

#[tokio::test]
async fn repeated_unauthorized_response_is_not_retried_again() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/api/apps/v2/a-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = api.get("/api/apps/v2/a-1", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Authentication);
    assert_eq!(err.status, Some(401));
    assert_eq!(api.tokens().exchange_count(), 2);
    assert_eq!(requests_to(&server, "/api/apps/v2/a-1").await.len(), 2);
}

#[tokio::test]
async fn query_values_are_sent_as_strings() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/api/apps/v2"))
        .and(query_param("limit", "25"))
        .and(query_param("search", "shop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    api.get("/api/apps/v2", Some(&json!({"limit": 25, "search": "shop"})))
        .await
        .expect("ok");
}
