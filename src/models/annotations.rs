use super::{check_blank, check_date, raw_field, Attributes, CalendarDate, Violation};
use crate::constants::limits;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `private` annotations are shown to their author only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Attributes of a user annotation, used by both create and update.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnnotationAttributes {
    /// Annotation text shown on analytics charts (max 150 characters).
    #[schemars(length(min = 1, max = 150))]
    pub content: String,
    /// Day the annotation is attached to, YYYY-MM-DD.
    pub date: CalendarDate,
    /// Who can see the annotation.
    #[serde(default)]
    pub visibility: Visibility,
}

impl Attributes for AnnotationAttributes {
    fn check_partial(raw: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        check_blank("content", raw, &mut out);
        if let Some(date) = raw_field::<CalendarDate>(raw, "date") {
            check_date("date", &date, &mut out);
        }
        out
    }

    fn check(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.content.trim().is_empty() {
            out.push(Violation::new("content", "must not be blank"));
        }
        if self.content.chars().count() > limits::ANNOTATION_CONTENT_MAX {
            out.push(Violation::new(
                "content",
                format!("must be at most {} characters", limits::ANNOTATION_CONTENT_MAX),
            ));
        }
        check_date("date", &self.date, &mut out);
        out
    }
}

fn default_limit() -> u32 {
    limits::LIST_LIMIT_DEFAULT
}

/// Filters and paging for annotation listings.
///
/// `date_from` and `date_to` describe ranges pairwise: the n-th start belongs
/// to the n-th end, so both lists must have the same length when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnnotationListAttributes {
    /// Range start dates, YYYY-MM-DD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<Vec<CalendarDate>>,
    /// Range end dates, YYYY-MM-DD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<Vec<CalendarDate>>,
    /// Maximum number of annotations to return.
    #[serde(default = "default_limit")]
    #[schemars(range(min = 1, max = 1000))]
    pub limit: u32,
    /// Number of annotations to skip.
    #[serde(default)]
    pub offset: u64,
}

impl Default for AnnotationListAttributes {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn check_date_list(field: &str, dates: Option<&Vec<CalendarDate>>, out: &mut Vec<Violation>) {
    for (idx, date) in dates.into_iter().flatten().enumerate() {
        check_date(&format!("{}[{}]", field, idx), date, out);
    }
}

impl Attributes for AnnotationListAttributes {
    fn check_partial(raw: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        for field in ["date_from", "date_to"] {
            let dates = raw_field::<Vec<CalendarDate>>(raw, field);
            check_date_list(field, dates.as_ref(), &mut out);
        }
        out
    }

    fn check(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        check_date_list("date_from", self.date_from.as_ref(), &mut out);
        check_date_list("date_to", self.date_to.as_ref(), &mut out);
        if let (Some(from), Some(to)) = (&self.date_from, &self.date_to) {
            if from.len() != to.len() {
                out.push(Violation::new(
                    "date_to",
                    format!(
                        "date_from and date_to must have the same number of items ({} vs {})",
                        from.len(),
                        to.len()
                    ),
                ));
            }
        }
        if self.limit == 0 || self.limit > limits::LIST_LIMIT_MAX {
            out.push(Violation::new(
                "limit",
                format!("must be between 1 and {}", limits::LIST_LIMIT_MAX),
            ));
        }
        out
    }
}
