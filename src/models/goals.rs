use super::{check_blank, raw_field, Attributes, Violation};
use serde_json::Value;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Visitor interaction that completes a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GoalTrigger {
    Url,
    Title,
    EventName,
    EventCategory,
    EventAction,
    File,
    ExternalWebsite,
    Manually,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Contains,
    Exact,
    Regex,
}

/// Matching rule applied to the trigger value.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GoalPattern {
    /// How `value` is compared against the trigger.
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// Text or expression to match.
    #[schemars(length(min = 1))]
    pub value: String,
    /// Whether matching is case sensitive.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl GoalPattern {
    fn check(&self, out: &mut Vec<Violation>) {
        if self.pattern_type == PatternType::Regex {
            if let Err(err) = regex::Regex::new(&self.value) {
                out.push(Violation::new(
                    "pattern.value",
                    format!("is not a valid regular expression: {}", err),
                ));
            }
        }
    }
}

/// Attributes accepted when creating a goal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GoalCreateAttributes {
    /// Goal name (1 to 255 characters).
    #[schemars(length(min = 1, max = 255))]
    pub name: String,
    /// Free-text description (max 1024 characters).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 1024))]
    pub description: Option<String>,
    /// Interaction that converts the goal.
    pub trigger: GoalTrigger,
    /// Revenue credited per conversion.
    #[schemars(range(min = 0.0))]
    pub revenue: f64,
    /// Whether one visit can convert the goal more than once.
    #[serde(default)]
    pub allow_multiple: bool,
    /// Matching rule for the trigger. Not used with `manually`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<GoalPattern>,
}

fn check_raw_goal(raw: &Value) -> Vec<Violation> {
    let mut out = Vec::new();
    check_blank("name", raw, &mut out);
    if let Some(pattern) = raw_field::<GoalPattern>(raw, "pattern") {
        pattern.check(&mut out);
    }
    out
}

impl Attributes for GoalCreateAttributes {
    fn check_partial(raw: &Value) -> Vec<Violation> {
        check_raw_goal(raw)
    }

    fn check(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.name.trim().is_empty() {
            out.push(Violation::new("name", "must not be blank"));
        }
        if !self.revenue.is_finite() || self.revenue < 0.0 {
            out.push(Violation::new("revenue", "must be a non-negative number"));
        }
        if let Some(pattern) = &self.pattern {
            pattern.check(&mut out);
        }
        out
    }
}

/// Attributes accepted when updating a goal. Omitted fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GoalUpdateAttributes {
    /// Goal name (1 to 255 characters).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// Free-text description (max 1024 characters).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 1024))]
    pub description: Option<String>,
    /// Interaction that converts the goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<GoalTrigger>,
    /// Revenue credited per conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0.0))]
    pub revenue: Option<f64>,
    /// Whether one visit can convert the goal more than once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    /// Matching rule for the trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<GoalPattern>,
}

impl Attributes for GoalUpdateAttributes {
    fn check_partial(raw: &Value) -> Vec<Violation> {
        check_raw_goal(raw)
    }

    fn check(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            out.push(Violation::new("name", "must not be blank"));
        }
        if let Some(pattern) = &self.pattern {
            pattern.check(&mut out);
        }
        out
    }
}
