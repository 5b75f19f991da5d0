use serde::Serialize;
use serde_json::Value;

/// Closed set of upstream failure kinds.
///
/// Classification depends only on the transport outcome, the HTTP status and
/// the shape of the response body, never on which endpoint was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    Authentication,
    NotFound,
    BadRequest,
    Conflict,
    RateLimit,
    Server,
    Transport,
    UnexpectedResponse,
}

impl ApiErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ApiErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ApiErrorKind::NotFound => "NOT_FOUND",
            ApiErrorKind::BadRequest => "BAD_REQUEST",
            ApiErrorKind::Conflict => "CONFLICT",
            ApiErrorKind::RateLimit => "RATE_LIMITED",
            ApiErrorKind::Server => "SERVER_ERROR",
            ApiErrorKind::Transport => "TRANSPORT_ERROR",
            ApiErrorKind::UnexpectedResponse => "UNEXPECTED_RESPONSE",
        }
    }
}

#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip)]
    pub timed_out: bool,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            payload: None,
            retry_after: None,
            timed_out: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Authentication, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::BadRequest, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transport, message)
    }

    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::UnexpectedResponse, message)
    }

    pub fn is_authentication(&self) -> bool {
        self.kind == ApiErrorKind::Authentication
    }

    /// Classify a non-success HTTP response.
    pub fn from_response(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let payload: Option<Value> = serde_json::from_str(body).ok();
        let detail = payload
            .as_ref()
            .and_then(extract_upstream_message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            });

        let (kind, label) = match status {
            401 | 403 => (ApiErrorKind::Authentication, "Authentication failed"),
            404 => (ApiErrorKind::NotFound, "Resource not found"),
            409 => (ApiErrorKind::Conflict, "Conflict"),
            429 => (ApiErrorKind::RateLimit, "Rate limit exceeded"),
            400 | 422 => (ApiErrorKind::BadRequest, "Bad request"),
            500..=599 => (ApiErrorKind::Server, "Server error"),
            402..=499 => (ApiErrorKind::BadRequest, "Request rejected"),
            _ => (ApiErrorKind::UnexpectedResponse, "Unexpected response status"),
        };

        let message = match (&kind, detail) {
            // The validation detail is the actionable part, keep it verbatim.
            (ApiErrorKind::BadRequest, Some(detail)) => detail,
            (_, Some(detail)) => format!("{} ({}): {}", label, status, detail),
            (_, None) => format!("{} ({})", label, status),
        };

        let retry_after = if kind == ApiErrorKind::RateLimit {
            retry_after
        } else {
            None
        };

        ApiError::new(kind, message)
            .with_status(status)
            .with_payload(payload)
            .with_retry_after(retry_after)
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let mut out = ApiError::transport("HTTP request timed out");
            out.timed_out = true;
            return out;
        }
        if err.is_decode() {
            return ApiError::unexpected_response(format!("Failed to decode response: {}", err));
        }
        ApiError::transport(format!("HTTP request failed: {}", err))
    }
}

/// Pull a human-readable message out of the common upstream error shapes:
/// JSON:API `errors[]`, `{"message": ..}` and OAuth `{"error", "error_description"}`.
pub fn extract_upstream_message(payload: &Value) -> Option<String> {
    if let Some(errors) = payload.get("errors").and_then(|v| v.as_array()) {
        let parts: Vec<String> = errors
            .iter()
            .filter_map(|entry| {
                if let Some(text) = entry.as_str() {
                    return Some(text.to_string());
                }
                let text = entry
                    .get("detail")
                    .or_else(|| entry.get("title"))
                    .and_then(|v| v.as_str())?;
                let pointer = entry
                    .get("source")
                    .and_then(|s| s.get("pointer").or_else(|| s.get("parameter")))
                    .and_then(|v| v.as_str());
                Some(match pointer {
                    Some(pointer) => format!("{} ({})", text, pointer),
                    None => text.to_string(),
                })
            })
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("; "));
        }
    }
    if let Some(message) = payload.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    if let Some(error) = payload.get("error").and_then(|v| v.as_str()) {
        return Some(match payload.get("error_description").and_then(|v| v.as_str()) {
            Some(description) => format!("{}: {}", error, description),
            None => error.to_string(),
        });
    }
    None
}

/// Parse a `Retry-After` header given in delta-seconds.
pub fn parse_retry_after(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert_eq!(ApiError::from_response(401, "", None).kind, ApiErrorKind::Authentication);
        assert_eq!(ApiError::from_response(403, "", None).kind, ApiErrorKind::Authentication);
        assert_eq!(ApiError::from_response(404, "", None).kind, ApiErrorKind::NotFound);
        assert_eq!(ApiError::from_response(400, "", None).kind, ApiErrorKind::BadRequest);
        assert_eq!(ApiError::from_response(422, "", None).kind, ApiErrorKind::BadRequest);
        assert_eq!(ApiError::from_response(409, "", None).kind, ApiErrorKind::Conflict);
        assert_eq!(ApiError::from_response(429, "", None).kind, ApiErrorKind::RateLimit);
        assert_eq!(ApiError::from_response(500, "", None).kind, ApiErrorKind::Server);
        assert_eq!(ApiError::from_response(503, "", None).kind, ApiErrorKind::Server);
        assert_eq!(ApiError::from_response(405, "", None).kind, ApiErrorKind::BadRequest);
        assert_eq!(
            ApiError::from_response(302, "", None).kind,
            ApiErrorKind::UnexpectedResponse
        );
    }

    #[test]
    fn bad_request_keeps_jsonapi_detail_verbatim() {
        let body = r#"{"errors":[{"status":"400","title":"Invalid","detail":"This value should not be blank.","source":{"pointer":"/data/attributes/name"}}]}"#;
        let err = ApiError::from_response(400, body, None);
        assert_eq!(err.message, "This value should not be blank. (/data/attributes/name)");
        assert_eq!(err.status, Some(400));
        assert!(err.payload.is_some());
    }

    #[test]
    fn bad_request_falls_back_to_raw_text() {
        let err = ApiError::from_response(400, "plain failure", None);
        assert_eq!(err.message, "plain failure");
        assert!(err.payload.is_none());
    }

    #[test]
    fn rate_limit_keeps_retry_after_only_for_429() {
        let limited = ApiError::from_response(429, "", Some(30));
        assert_eq!(limited.retry_after, Some(30));
        let server = ApiError::from_response(503, "", Some(30));
        assert_eq!(server.retry_after, None);
    }

    #[test]
    fn oauth_error_shape_is_rendered() {
        let payload = serde_json::json!({"error": "invalid_client", "error_description": "bad secret"});
        assert_eq!(
            extract_upstream_message(&payload).as_deref(),
            Some("invalid_client: bad secret")
        );
    }

    #[test]
    fn retry_after_parses_seconds_only() {
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(12));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
