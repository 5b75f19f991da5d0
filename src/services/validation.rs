use crate::errors::ToolError;
use serde_json::Value;

/// Checks for the outer tool arguments (`website_id`, resource ids, paging).
/// Resource attributes go through the parameter registry instead.
#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(
        &self,
        value: &Value,
        label: &str,
        trim: bool,
    ) -> Result<String, ToolError> {
        let text = value.as_str().ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a non-empty string", label))
        })?;
        let normalized = text.trim();
        if normalized.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        Ok(if trim {
            normalized.to_string()
        } else {
            text.to_string()
        })
    }

    pub fn ensure_optional_string(
        &self,
        value: Option<&Value>,
        label: &str,
        trim: bool,
    ) -> Result<Option<String>, ToolError> {
        match value {
            None => Ok(None),
            Some(val) if val.is_null() => Ok(None),
            Some(val) => self.ensure_string(val, label, trim).map(Some),
        }
    }

    /// Identifiers end up inside URL paths, so separators and control bytes
    /// are rejected.
    pub fn ensure_identifier(&self, value: Option<&Value>, label: &str) -> Result<String, ToolError> {
        let value = value.filter(|v| !v.is_null()).ok_or_else(|| {
            ToolError::invalid_params(format!("{} is required", label))
        })?;
        let raw = match value {
            Value::Number(number) => number.to_string(),
            other => self.ensure_string(other, label, true)?,
        };
        if raw.chars().any(|c| c.is_control() || matches!(c, '/' | '?' | '#' | '\\')) {
            return Err(ToolError::invalid_params(format!(
                "{} must not contain '/', '?', '#', '\\' or control characters",
                label
            )));
        }
        Ok(raw)
    }

    pub fn ensure_website_id(&self, args: &Value) -> Result<String, ToolError> {
        self.ensure_identifier(args.get("website_id"), "website_id")
    }

    /// Integer in `[min, max]`; numeric strings are accepted.
    pub fn ensure_optional_u64(
        &self,
        value: Option<&Value>,
        label: &str,
        min: u64,
        max: u64,
    ) -> Result<Option<u64>, ToolError> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let numeric = value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u64>().ok()))
            .ok_or_else(|| {
                ToolError::invalid_params(format!(
                    "{} must be an integer between {} and {}",
                    label, min, max
                ))
            })?;
        if numeric < min || numeric > max {
            return Err(ToolError::invalid_params(format!(
                "{} must be an integer between {} and {}",
                label, min, max
            )));
        }
        Ok(Some(numeric))
    }

    pub fn ensure_object(
        &self,
        value: &Value,
        label: &str,
    ) -> Result<serde_json::Map<String, Value>, ToolError> {
        value
            .as_object()
            .cloned()
            .ok_or_else(|| ToolError::invalid_params(format!("{} must be an object", label)))
    }

    pub fn ensure_optional_object(
        &self,
        value: Option<&Value>,
        label: &str,
    ) -> Result<Option<serde_json::Map<String, Value>>, ToolError> {
        match value {
            None => Ok(None),
            Some(val) if val.is_null() => Ok(None),
            Some(val) => self.ensure_object(val, label).map(Some),
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
