use crate::errors::{ErrorCode, McpError};
use crate::services::parameters::Operation;
use crate::utils::suggest::suggest;
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn id_or_string() -> Value {
    json!({"type": ["string", "integer"], "minLength": 1})
}

fn paging_value(description: &str) -> Value {
    json!({"type": ["integer", "string"], "description": description})
}

fn attributes_property(operations: &[Operation]) -> Value {
    let names: Vec<&str> = operations.iter().map(|op| op.as_str()).collect();
    json!({
        "type": ["object", "null"],
        "description": format!(
            "Resource attributes. Schema: tools_parameters action=get operation={}",
            names.join(" | ")
        ),
    })
}

fn trace_id_property() -> Value {
    json!({"type": "string", "description": "Optional correlation id echoed in meta.trace_id."})
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    vec![
        ToolDef {
            name: "apps".to_string(),
            description: "Manage Piwik PRO apps (websites). Actions: list, get, create, update, delete.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "get", "create", "update", "delete"]},
                    "app_id": id_or_string(),
                    "search": {"type": "string", "description": "Filter apps by name or address (list)."},
                    "limit": paging_value("Page size for list (1-1000, default 10)."),
                    "offset": paging_value("Items to skip for list (default 0)."),
                    "attributes": attributes_property(&[Operation::AppsCreate, Operation::AppsUpdate]),
                    "trace_id": trace_id_property(),
                },
                "required": ["action"],
                "additionalProperties": false,
            }),
        },
        ToolDef {
            name: "analytics_goals".to_string(),
            description: "Manage Analytics goals of an app. Actions: list, get, create, update, delete.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "get", "create", "update", "delete"]},
                    "website_id": {"type": "string", "minLength": 1, "description": "App (website) UUID."},
                    "goal_id": id_or_string(),
                    "limit": paging_value("Page size for list (1-1000, default 10)."),
                    "offset": paging_value("Items to skip for list (default 0)."),
                    "attributes": attributes_property(&[Operation::GoalsCreate, Operation::GoalsUpdate]),
                    "trace_id": trace_id_property(),
                },
                "required": ["action", "website_id"],
                "additionalProperties": false,
            }),
        },
        ToolDef {
            name: "analytics_annotations".to_string(),
            description: "Manage Analytics user annotations and read system annotations. Actions: create, list, list_system, get, update, delete.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["create", "list", "list_system", "get", "update", "delete"]},
                    "website_id": {"type": "string", "minLength": 1, "description": "App (website) UUID. Not used by list_system."},
                    "annotation_id": id_or_string(),
                    "attributes": attributes_property(&[
                        Operation::AnnotationsCreate,
                        Operation::AnnotationsUpdate,
                        Operation::AnnotationsList,
                    ]),
                    "trace_id": trace_id_property(),
                },
                "required": ["action"],
                "additionalProperties": false,
            }),
        },
        ToolDef {
            name: "tools_parameters".to_string(),
            description: "Describe the attributes an operation accepts. Actions: get (JSON Schema for one operation), list (operation names).".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["get", "list"]},
                    "operation": {
                        "type": "string",
                        "description": "Operation name, e.g. goals_create.",
                    },
                    "trace_id": trace_id_property(),
                },
                "required": ["action"],
                "additionalProperties": false,
            }),
        },
    ]
});

static TOOL_MAP: Lazy<HashMap<String, ToolDef>> = Lazy::new(|| {
    TOOL_CATALOG
        .iter()
        .cloned()
        .map(|tool| (tool.name.clone(), tool))
        .collect()
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for tool in TOOL_CATALOG.iter() {
        if let Ok(schema) = JSONSchema::compile(&tool.input_schema) {
            map.insert(tool.name.clone(), schema);
        }
    }
    map
});

pub fn tool_catalog() -> &'static Vec<ToolDef> {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_MAP.get(name)
}

pub fn tool_names() -> Vec<String> {
    TOOL_CATALOG.iter().map(|tool| tool.name.clone()).collect()
}

/// Check the outer tool arguments against the catalog schema. Unknown tools
/// pass through; the executor reports them with suggestions.
pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), McpError> {
    let (Some(tool), Some(schema)) = (tool_by_name(tool_name), TOOL_VALIDATORS.get(tool_name))
    else {
        return Ok(());
    };
    if let Err(errors) = schema.validate(args) {
        let message = format_schema_errors(tool_name, args, errors, &tool.input_schema);
        return Err(McpError::new(ErrorCode::InvalidParams, message));
    }
    Ok(())
}

fn format_schema_errors(
    tool_name: &str,
    args: &Value,
    errors: jsonschema::ErrorIterator,
    schema: &Value,
) -> String {
    let action = args.get("action").and_then(|v| v.as_str());
    let header = match action {
        Some(action) => format!("Invalid arguments for {}:{}", tool_name, action),
        None => format!("Invalid arguments for {}", tool_name),
    };
    let known_fields: Vec<String> = schema
        .get("properties")
        .and_then(|v| v.as_object())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    let mut rendered = Vec::new();
    let mut did_you_means = Vec::new();
    for err in errors.take(10) {
        let path = err.instance_path.to_string();
        let at = if path.is_empty() {
            "(root)".to_string()
        } else {
            path.clone()
        };
        match &err.kind {
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for unknown in unexpected {
                    rendered.push(format!("{}: unknown field '{}'", at, unknown));
                    let suggestions = suggest(unknown, &known_fields, 3);
                    if !suggestions.is_empty() {
                        did_you_means.push(format!(
                            "field '{}': {}",
                            unknown,
                            suggestions.join(", ")
                        ));
                    }
                }
            }
            ValidationErrorKind::Enum { options } => {
                let allowed: Vec<String> = options
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                rendered.push(format!("{}: expected one of {}", at, allowed.join(", ")));
                let received = args
                    .pointer(&path)
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let suggestions = suggest(received, &allowed, 3);
                if !suggestions.is_empty() {
                    did_you_means.push(format!("{}: {}", at, suggestions.join(", ")));
                }
            }
            ValidationErrorKind::Required { property } => {
                let prop = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                rendered.push(format!("{}: missing required field '{}'", at, prop));
            }
            ValidationErrorKind::Type { kind } => {
                rendered.push(format!("{}: expected {}", at, format_type_kind(kind)));
            }
            _ => rendered.push(format!("{}: {}", at, err)),
        }
    }

    let mut lines = vec![header];
    lines.extend(rendered.iter().map(|line| format!("- {}", line)));
    if !did_you_means.is_empty() {
        lines.push(format!("Did you mean: {}", did_you_means.join(" | ")));
    }
    lines.push(
        "Hint: attribute schemas are available via tools_parameters action=list / action=get"
            .to_string(),
    );
    lines.join("\n")
}

fn format_type_kind(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(primitive) => primitive.to_string(),
        TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_schema_compiles() {
        for tool in tool_catalog() {
            assert!(
                TOOL_VALIDATORS.contains_key(&tool.name),
                "schema for {} must compile",
                tool.name
            );
        }
    }

    #[test]
    fn unknown_fields_get_suggestions() {
        let err = validate_tool_args(
            "analytics_goals",
            &json!({"action": "get", "website_id": "w-1", "goalid": "g-1"}),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert!(err.message.contains("unknown field 'goalid'"));
        assert!(err.message.contains("goal_id"));
    }

    #[test]
    fn action_typos_get_suggestions() {
        let err = validate_tool_args("apps", &json!({"action": "lst"})).unwrap_err();
        assert!(err.message.contains("expected one of"));
        assert!(err.message.contains("Did you mean"));
    }
}
