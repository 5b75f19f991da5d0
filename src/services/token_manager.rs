//! Bearer token lifecycle for the OAuth2 client-credentials grant.
//!
//! The manager holds at most one token. It is checked lazily before every
//! use and replaced when it is within the skew margin of expiry or when the
//! upstream rejects it. All exchanges happen while the slot lock is held, so
//! concurrent callers wait for a single in-flight exchange and reuse its
//! result. The slot is only written after an exchange has fully succeeded.

use crate::config::Credentials;
use crate::constants::auth;
use crate::errors::{ApiError, ApiErrorKind};
use crate::services::logger::Logger;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Used when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 1_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Unauthenticated,
    Valid,
    Expired,
}

#[derive(Clone)]
struct Token {
    access_token: String,
    expires_at: Instant,
}

impl Token {
    fn is_usable(&self, skew: Duration) -> bool {
        Instant::now()
            .checked_add(skew)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct TokenManager {
    logger: Logger,
    http: Client,
    credentials: Credentials,
    token_url: String,
    skew: Duration,
    timeout: Duration,
    slot: Mutex<Option<Token>>,
    exchanges: AtomicU64,
}

impl TokenManager {
    pub fn new(
        logger: Logger,
        http: Client,
        credentials: Credentials,
        skew: Duration,
        timeout: Duration,
    ) -> Self {
        let token_url = format!("{}{}", credentials.host(), auth::TOKEN_PATH);
        Self {
            logger: logger.child("token"),
            http,
            credentials,
            token_url,
            skew,
            timeout,
            slot: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Return a token that is valid beyond the skew margin, exchanging
    /// credentials first when needed.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_usable(self.skew) {
                return Ok(token.access_token.clone());
            }
            self.logger.debug("token expired or inside skew margin", None);
        }
        let token = self.exchange().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    /// Replace a token the upstream rejected. If another caller already
    /// replaced it, the replacement is returned without a new exchange.
    pub async fn force_refresh(&self, rejected: &str) -> Result<String, ApiError> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.access_token != rejected && token.is_usable(self.skew) {
                return Ok(token.access_token.clone());
            }
        }
        *slot = None;
        self.logger.info("token rejected upstream, re-authenticating", None);
        let token = self.exchange().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    pub async fn state(&self) -> TokenState {
        match self.slot.lock().await.as_ref() {
            None => TokenState::Unauthenticated,
            Some(token) if token.is_usable(self.skew) => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    /// Number of credential exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    async fn exchange(&self) -> Result<Token, ApiError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let body = serde_json::json!({
            "grant_type": auth::GRANT_TYPE,
            "client_id": self.credentials.client_id(),
            "client_secret": self.credentials.client_secret(),
        });

        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::from_reqwest)?;
        if !status.is_success() {
            self.logger.warn(
                "token exchange rejected",
                Some(&serde_json::json!({ "status": status.as_u16() })),
            );
            let mut err = ApiError::from_response(status.as_u16(), &text, None);
            err.kind = ApiErrorKind::Authentication;
            err.retry_after = None;
            err.message = format!("Token exchange failed: {}", err.message);
            return Err(err);
        }

        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|_| {
            ApiError::unexpected_response("Token endpoint returned an unparseable response")
                .with_status(status.as_u16())
        })?;
        if parsed.access_token.trim().is_empty() {
            return Err(
                ApiError::unexpected_response("Token endpoint returned an empty access_token")
                    .with_status(status.as_u16()),
            );
        }

        let lifetime = parsed
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .min(auth::MAX_TOKEN_LIFETIME_SECS);
        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(lifetime))
            .ok_or_else(|| {
                ApiError::unexpected_response("Token lifetime is out of range")
                    .with_status(status.as_u16())
            })?;
        self.logger.debug(
            "token exchange completed",
            Some(&serde_json::json!({
                "expires_in": lifetime,
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );
        Ok(Token {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}
