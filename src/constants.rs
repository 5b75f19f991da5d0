pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_CONNECTION_MS: u64 = 5_000;
    pub const USER_AGENT: &str = concat!("piwik-pro-mcp/", env!("CARGO_PKG_VERSION"));
    pub const LOCALHOST_NAMES: &[&str] = &["localhost", "127.0.0.1"];
}

pub mod auth {
    pub const TOKEN_PATH: &str = "/auth/token";
    pub const GRANT_TYPE: &str = "client_credentials";
    pub const TOKEN_SKEW_SECS: u64 = 60;
    pub const MAX_TOKEN_SKEW_SECS: u64 = 3_600;
    /// Longer `expires_in` values are clamped to this.
    pub const MAX_TOKEN_LIFETIME_SECS: u64 = 86_400;
}

pub mod media {
    pub const JSON_API: &str = "application/vnd.api+json";
    pub const ACCEPT: &str = "application/vnd.api+json, application/json";
}

pub mod api {
    pub const APPS_BASE: &str = "/api/apps/v2";
    pub const GOALS_BASE: &str = "/api/analytics/v1/manage/goals/";
    pub const USER_ANNOTATIONS_BASE: &str = "/api/analytics/v1/manage/annotation/user/";
    pub const SYSTEM_ANNOTATIONS_BASE: &str = "/api/analytics/v1/manage/annotation/system/";
}

pub mod limits {
    pub const ANNOTATION_CONTENT_MAX: usize = 150;
    pub const NAME_MAX: usize = 255;
    pub const DESCRIPTION_MAX: usize = 1024;
    pub const LIST_LIMIT_DEFAULT: u32 = 10;
    pub const LIST_LIMIT_MAX: u32 = 1_000;
    pub const MAX_REPORTED_VIOLATIONS: usize = 50;
    pub const LOG_ARGS_MAX_STRING: usize = 256;
}

pub mod env {
    pub const HOST: &str = "PIWIK_PRO_HOST";
    pub const CLIENT_ID: &str = "PIWIK_PRO_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "PIWIK_PRO_CLIENT_SECRET";
    pub const TIMEOUT_MS: &str = "PIWIK_PRO_TIMEOUT_MS";
    pub const TOKEN_SKEW_SECS: &str = "PIWIK_PRO_TOKEN_SKEW_SECS";
    pub const ENV_FILE: &str = "PIWIK_PRO_ENV_FILE";
}
