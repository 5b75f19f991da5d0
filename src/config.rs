//! Process configuration.
//!
//! Credentials and tuning knobs are read once at startup from the environment,
//! optionally seeded from an env-file. Variables already present in the
//! environment take precedence over the file.

use crate::constants::{auth, env, network};
use crate::errors::ToolError;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use url::Url;

/// Client-credentials identity of this process. Immutable once built.
#[derive(Clone)]
pub struct Credentials {
    host: String,
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(host: &str, client_id: &str, client_secret: &str) -> Result<Self, ToolError> {
        let client_id = client_id.trim();
        let client_secret = client_secret.trim();
        if client_id.is_empty() {
            return Err(ToolError::configuration("client_id must not be empty"));
        }
        if client_secret.is_empty() {
            return Err(ToolError::configuration("client_secret must not be empty"));
        }
        Ok(Self {
            host: normalize_host(host)?,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Base URL without a trailing slash, e.g. `https://account.piwik.pro`.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub timeout_ms: u64,
    pub token_skew_secs: u64,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            timeout_ms: network::TIMEOUT_API_REQUEST_MS,
            token_skew_secs: auth::TOKEN_SKEW_SECS,
        }
    }

    /// Load the env-file (explicit path, `PIWIK_PRO_ENV_FILE`, or `.env`) and
    /// then read the process environment.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ToolError> {
        let explicit = env_file
            .map(|p| p.to_path_buf())
            .or_else(|| std::env::var_os(env::ENV_FILE).map(Into::into));
        match explicit {
            Some(path) => {
                dotenvy::from_path(&path).map_err(|err| {
                    ToolError::configuration(format!(
                        "Failed to load env file {}: {}",
                        path.display(),
                        err
                    ))
                })?;
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ToolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ToolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ToolError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ToolError::configuration(format!("{} is not set", key)).with_hint(format!(
                        "Set {}, {} and {} in the environment or an env file.",
                        env::HOST,
                        env::CLIENT_ID,
                        env::CLIENT_SECRET
                    ))
                })
        };

        let credentials = Credentials::new(
            &required(env::HOST)?,
            &required(env::CLIENT_ID)?,
            &required(env::CLIENT_SECRET)?,
        )?;

        let mut config = Config::new(credentials);
        if let Some(timeout_ms) = parse_u64(&lookup, env::TIMEOUT_MS)? {
            if timeout_ms == 0 {
                return Err(ToolError::configuration(format!(
                    "{} must be greater than zero",
                    env::TIMEOUT_MS
                )));
            }
            config.timeout_ms = timeout_ms;
        }
        if let Some(skew) = parse_u64(&lookup, env::TOKEN_SKEW_SECS)? {
            if skew > auth::MAX_TOKEN_SKEW_SECS {
                return Err(ToolError::configuration(format!(
                    "{} must be at most {}",
                    env::TOKEN_SKEW_SECS,
                    auth::MAX_TOKEN_SKEW_SECS
                )));
            }
            config.token_skew_secs = skew;
        }
        Ok(config)
    }

    /// Redacted view for diagnostics.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "host": self.credentials.host(),
            "client_id": self.credentials.client_id(),
            "client_secret": "[REDACTED]",
            "timeout_ms": self.timeout_ms,
            "token_skew_secs": self.token_skew_secs,
        })
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ToolError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ToolError::configuration(format!("{} must be a non-negative integer", key)))
}

/// Normalize the configured host into a base URL. A bare hostname gets
/// `https://`; anything other than localhost must use https.
pub fn normalize_host(raw: &str) -> Result<String, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ToolError::configuration("host must not be empty")
            .with_hint("Expected e.g. \"account.piwik.pro\" or \"https://account.piwik.pro\"."));
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    let url = Url::parse(&candidate).map_err(|_| {
        ToolError::configuration("Invalid host URL")
            .with_details(serde_json::json!({ "host": raw }))
    })?;
    let host_name = url
        .host_str()
        .ok_or_else(|| ToolError::configuration("host must include a hostname"))?;
    let is_local = network::LOCALHOST_NAMES
        .iter()
        .any(|name| host_name.eq_ignore_ascii_case(name));
    match url.scheme() {
        "https" => {}
        "http" if is_local => {}
        other => {
            return Err(ToolError::configuration(format!(
                "host must use https for non-local hosts; got '{}://'",
                other
            )))
        }
    }
    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn bare_host_gets_https_and_loses_path() {
        assert_eq!(
            normalize_host("acme.piwik.pro/some/path").unwrap(),
            "https://acme.piwik.pro"
        );
        assert_eq!(
            normalize_host("https://acme.piwik.pro/").unwrap(),
            "https://acme.piwik.pro"
        );
    }

    #[test]
    fn plain_http_only_for_localhost() {
        assert_eq!(
            normalize_host("http://127.0.0.1:8080").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(normalize_host("http://acme.piwik.pro").is_err());
    }

    #[test]
    fn missing_variables_are_reported_by_name() {
        let err = Config::from_lookup(lookup_from(&[("PIWIK_PRO_HOST", "acme.piwik.pro")]))
            .unwrap_err();
        assert!(err.message.contains("PIWIK_PRO_CLIENT_ID"));
    }

    #[test]
    fn reads_optional_tuning_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("PIWIK_PRO_HOST", "acme.piwik.pro"),
            ("PIWIK_PRO_CLIENT_ID", "id"),
            ("PIWIK_PRO_CLIENT_SECRET", "secret"),
            ("PIWIK_PRO_TIMEOUT_MS", "1500"),
            ("PIWIK_PRO_TOKEN_SKEW_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.token_skew_secs, 5);
        assert_eq!(config.summary()["client_secret"], "[REDACTED]");
    }

    #[test]
    fn oversized_token_skew_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("PIWIK_PRO_HOST", "acme.piwik.pro"),
            ("PIWIK_PRO_CLIENT_ID", "id"),
            ("PIWIK_PRO_CLIENT_SECRET", "secret"),
            ("PIWIK_PRO_TOKEN_SKEW_SECS", "18446744073709551615"),
        ]))
        .unwrap_err();
        assert_eq!(err.code, "CONFIGURATION_ERROR");
        assert!(err.message.contains("PIWIK_PRO_TOKEN_SKEW_SECS"));
    }

    #[test]
    fn debug_output_never_contains_secret() {
        let creds = Credentials::new("acme.piwik.pro", "id", "very-secret-value").unwrap();
        assert!(!format!("{:?}", creds).contains("very-secret-value"));
    }
}
