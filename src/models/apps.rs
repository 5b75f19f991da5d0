use super::{check_blank, raw_field, Attributes, Violation};
use serde_json::Value;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    #[default]
    Web,
    Sharepoint,
    Demo,
}

/// Attributes accepted when creating an app (website).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AppCreateAttributes {
    /// Display name (1 to 255 characters).
    #[schemars(length(min = 1, max = 255))]
    pub name: String,
    /// Addresses the app is tracked on, at least one.
    #[schemars(length(min = 1))]
    pub urls: Vec<String>,
    /// Kind of app.
    #[serde(default)]
    pub app_type: AppType,
    /// IANA time zone used for reports, e.g. `Europe/Warsaw`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// ISO 4217 currency code, e.g. `EUR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^[A-Z]{3}$"))]
    pub currency: Option<String>,
    /// Enable GDPR features (consent handling, data anonymization).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<bool>,
    /// Enable real-time dashboards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_time_dashboards: Option<bool>,
}

fn check_raw_app(raw: &Value) -> Vec<Violation> {
    let mut out = Vec::new();
    check_blank("name", raw, &mut out);
    if let Some(urls) = raw_field::<Vec<String>>(raw, "urls") {
        check_urls(&urls, &mut out);
    }
    out
}

impl Attributes for AppCreateAttributes {
    fn check_partial(raw: &Value) -> Vec<Violation> {
        check_raw_app(raw)
    }

    fn check(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.name.trim().is_empty() {
            out.push(Violation::new("name", "must not be blank"));
        }
        check_urls(&self.urls, &mut out);
        out
    }
}

/// Attributes accepted when updating an app. Omitted fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppUpdateAttributes {
    /// Display name (1 to 255 characters).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// Replaces the tracked addresses, at least one.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1))]
    pub urls: Option<Vec<String>>,
    /// Kind of app.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_type: Option<AppType>,
    /// IANA time zone used for reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// ISO 4217 currency code.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^[A-Z]{3}$"))]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_time_dashboards: Option<bool>,
}

impl Attributes for AppUpdateAttributes {
    fn check_partial(raw: &Value) -> Vec<Violation> {
        check_raw_app(raw)
    }

    fn check(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            out.push(Violation::new("name", "must not be blank"));
        }
        if let Some(urls) = &self.urls {
            check_urls(urls, &mut out);
        }
        out
    }
}

fn check_urls(urls: &[String], out: &mut Vec<Violation>) {
    for (idx, raw) in urls.iter().enumerate() {
        let ok = Url::parse(raw.trim())
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
            .unwrap_or(false);
        if !ok {
            out.push(Violation::new(
                format!("urls[{}]", idx),
                format!("'{}' is not an absolute http(s) URL", raw),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_are_reported_by_index() {
        let attrs = AppCreateAttributes {
            name: "Shop".to_string(),
            urls: vec!["https://shop.example".to_string(), "shop.example".to_string()],
            app_type: AppType::Web,
            timezone: None,
            currency: None,
            gdpr: None,
            real_time_dashboards: None,
        };
        let violations = attrs.check();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "urls[1]");
    }
}
