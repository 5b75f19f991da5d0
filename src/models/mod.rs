//! Typed attribute models for every operation that accepts free-form
//! attributes. The JSON Schemas served by `tools_parameters` are derived from
//! these types, so field docs here are what callers read.

pub mod annotations;
pub mod apps;
pub mod goals;

use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

pub use annotations::{AnnotationAttributes, AnnotationListAttributes, Visibility};
pub use apps::{AppCreateAttributes, AppType, AppUpdateAttributes};
pub use goals::{GoalCreateAttributes, GoalPattern, GoalTrigger, GoalUpdateAttributes, PatternType};

pub const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

/// One failed rule, addressed by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An attribute model the parameter registry can serve and enforce.
pub trait Attributes: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Rules spanning several fields, or stricter than a schema can say.
    fn check(&self) -> Vec<Violation> {
        Vec::new()
    }

    /// The subset of [`check`](Attributes::check) that still applies when the
    /// raw payload does not deserialize into the model.
    fn check_partial(_raw: &Value) -> Vec<Violation> {
        Vec::new()
    }
}

/// `YYYY-MM-DD` calendar date, kept as the caller's string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(pub String);

impl CalendarDate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        chrono::NaiveDate::parse_from_str(&self.0, "%Y-%m-%d").is_ok()
    }
}

impl JsonSchema for CalendarDate {
    fn inline_schema() -> bool {
        true
    }

    fn schema_name() -> Cow<'static, str> {
        "CalendarDate".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "string",
            "pattern": DATE_PATTERN,
            "description": "Calendar date in YYYY-MM-DD format."
        })
    }
}

pub(crate) fn check_date(field: &str, date: &CalendarDate, out: &mut Vec<Violation>) {
    if !date.is_valid() {
        out.push(Violation::new(
            field,
            format!("'{}' is not a valid calendar date", date.as_str()),
        ));
    }
}

/// Typed view of one raw field, `None` when it is absent or has the wrong shape.
pub(crate) fn raw_field<T: DeserializeOwned>(raw: &Value, field: &str) -> Option<T> {
    raw.get(field)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

pub(crate) fn check_blank(field: &str, raw: &Value, out: &mut Vec<Violation>) {
    if matches!(raw.get(field), Some(Value::String(text)) if !text.is_empty() && text.trim().is_empty())
    {
        out.push(Violation::new(field, "must not be blank"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_date_rejects_impossible_days() {
        assert!(CalendarDate("2024-02-29".to_string()).is_valid());
        assert!(!CalendarDate("2023-02-29".to_string()).is_valid());
        assert!(!CalendarDate("2024-13-01".to_string()).is_valid());
    }
}
