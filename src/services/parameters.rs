//! Operation parameter registry.
//!
//! Maps each [`Operation`] to its typed attribute model, the draft-07 schema
//! derived from that model, and a compiled validator. Built once at startup
//! and read-only afterwards.

use crate::constants::limits;
use crate::errors::ToolError;
use crate::models::{
    AnnotationAttributes, AnnotationListAttributes, AppCreateAttributes, AppUpdateAttributes,
    Attributes, GoalCreateAttributes, GoalUpdateAttributes, Violation,
};
use crate::utils::suggest::suggest;
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{Draft, JSONSchema, ValidationError};
use schemars::generate::SchemaSettings;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AppsCreate,
    AppsUpdate,
    GoalsCreate,
    GoalsUpdate,
    AnnotationsCreate,
    AnnotationsUpdate,
    AnnotationsList,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::AppsCreate,
        Operation::AppsUpdate,
        Operation::GoalsCreate,
        Operation::GoalsUpdate,
        Operation::AnnotationsCreate,
        Operation::AnnotationsUpdate,
        Operation::AnnotationsList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::AppsCreate => "apps_create",
            Operation::AppsUpdate => "apps_update",
            Operation::GoalsCreate => "goals_create",
            Operation::GoalsUpdate => "goals_update",
            Operation::AnnotationsCreate => "annotations_create",
            Operation::AnnotationsUpdate => "annotations_update",
            Operation::AnnotationsList => "annotations_list",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::parse(s).ok_or_else(|| unknown_operation(s))
    }
}

/// Deserialize, check, and re-serialize through the typed model. This is the
/// step that applies defaults and drops fields the model does not know.
trait Normalizer: Send + Sync {
    fn normalize(&self, value: Value) -> Result<Value, Vec<Violation>>;

    /// Model rules for a payload that already failed the schema pass.
    fn model_violations(&self, value: &Value) -> Vec<Violation>;
}

struct TypedModel<T>(PhantomData<fn() -> T>);

impl<T: Attributes> Normalizer for TypedModel<T> {
    fn normalize(&self, value: Value) -> Result<Value, Vec<Violation>> {
        let typed: T = serde_json::from_value(value)
            .map_err(|err| vec![Violation::new("(root)", err.to_string())])?;
        let violations = typed.check();
        if !violations.is_empty() {
            return Err(violations);
        }
        serde_json::to_value(&typed).map_err(|err| vec![Violation::new("(root)", err.to_string())])
    }

    fn model_violations(&self, value: &Value) -> Vec<Violation> {
        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => typed.check(),
            Err(_) => T::check_partial(value),
        }
    }
}

struct Entry {
    schema: Value,
    validator: JSONSchema,
    model: Box<dyn Normalizer>,
}

pub struct ParameterRegistry {
    entries: HashMap<Operation, Entry>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<Operation, Entry>,
}

impl RegistryBuilder {
    pub fn register<T: Attributes>(mut self, operation: Operation) -> Result<Self, ToolError> {
        if self.entries.contains_key(&operation) {
            return Err(ToolError::configuration(format!(
                "Operation '{}' is registered more than once",
                operation
            )));
        }
        let schema = schema_of::<T>().map_err(|err| err.with_context(operation.as_str()))?;
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|err| {
                ToolError::configuration(format!(
                    "Schema for '{}' does not compile: {}",
                    operation, err
                ))
            })?;
        self.entries.insert(
            operation,
            Entry {
                schema,
                validator,
                model: Box::new(TypedModel::<T>(PhantomData)),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> ParameterRegistry {
        ParameterRegistry {
            entries: self.entries,
        }
    }
}

impl ParameterRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with every operation the tools use. Fails if any
    /// [`Operation`] is left without a model.
    pub fn standard() -> Result<Self, ToolError> {
        let registry = Self::builder()
            .register::<AppCreateAttributes>(Operation::AppsCreate)?
            .register::<AppUpdateAttributes>(Operation::AppsUpdate)?
            .register::<GoalCreateAttributes>(Operation::GoalsCreate)?
            .register::<GoalUpdateAttributes>(Operation::GoalsUpdate)?
            .register::<AnnotationAttributes>(Operation::AnnotationsCreate)?
            .register::<AnnotationAttributes>(Operation::AnnotationsUpdate)?
            .register::<AnnotationListAttributes>(Operation::AnnotationsList)?
            .build();

        let missing: Vec<&str> = Operation::ALL
            .iter()
            .filter(|op| !registry.entries.contains_key(op))
            .map(|op| op.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::configuration(format!(
                "No parameter model registered for: {}",
                missing.join(", ")
            )));
        }
        Ok(registry)
    }

    /// Registered operation names in declaration order.
    pub fn operations(&self) -> Vec<&'static str> {
        Operation::ALL
            .iter()
            .filter(|op| self.entries.contains_key(op))
            .map(|op| op.as_str())
            .collect()
    }

    pub fn schema(&self, operation: Operation) -> Option<&Value> {
        self.entries.get(&operation).map(|entry| &entry.schema)
    }

    /// JSON Schema for an operation looked up by name.
    pub fn schema_for(&self, name: &str) -> Result<Value, ToolError> {
        let operation = name.parse::<Operation>()?;
        self.schema(operation)
            .cloned()
            .ok_or_else(|| unknown_operation(name))
    }

    /// Field names the schema marks as required at the top level.
    pub fn required_fields(&self, operation: Operation) -> Vec<String> {
        self.schema(operation)
            .and_then(|schema| schema.get("required"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check raw attributes and return the normalized payload.
    ///
    /// Every violation is collected into a single `InvalidParams` error whose
    /// details list `{field, message}` pairs.
    pub fn validate(&self, operation: Operation, raw: &Value) -> Result<Value, ToolError> {
        let entry = self.entries.get(&operation).ok_or_else(|| {
            ToolError::configuration(format!(
                "No parameter model registered for '{}'",
                operation
            ))
        })?;

        let mut value = if raw.is_null() {
            Value::Object(Map::new())
        } else {
            raw.clone()
        };
        strip_nulls(&mut value);
        coerce(&mut value, &entry.schema, &entry.schema);

        let mut violations: Vec<Violation> = match entry.validator.validate(&value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|err| violation_from(&err)).collect(),
        };
        if violations.is_empty() {
            match entry.model.normalize(value) {
                Ok(normalized) => return Ok(normalized),
                Err(found) => violations = found,
            }
        } else {
            // One message per field: a schema violation wins over a model rule.
            let extra: Vec<Violation> = entry
                .model
                .model_violations(&value)
                .into_iter()
                .filter(|v| !violations.iter().any(|seen| seen.field == v.field))
                .collect();
            violations.extend(extra);
        }
        Err(invalid_attributes(operation, violations))
    }

    /// Same as [`validate`](Self::validate) with the operation given by name.
    /// An unknown name here is a wiring mistake, not a caller error.
    pub fn validate_named(&self, name: &str, raw: &Value) -> Result<Value, ToolError> {
        let operation = Operation::parse(name).ok_or_else(|| {
            ToolError::configuration(format!("Unknown operation '{}' used internally", name))
        })?;
        self.validate(operation, raw)
    }
}

fn schema_of<T: Attributes>() -> Result<Value, ToolError> {
    let root = SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(&root)
        .map_err(|err| ToolError::configuration(format!("Schema is not serializable: {}", err)))?;
    drop_null_branches(&mut schema);
    Ok(schema)
}

/// Nulls are treated as absent before validation, so `null` alternatives in
/// the generated schema only add noise to error messages.
fn drop_null_branches(schema: &mut Value) {
    let Some(map) = schema.as_object_mut() else {
        if let Some(items) = schema.as_array_mut() {
            items.iter_mut().for_each(drop_null_branches);
        }
        return;
    };

    if let Some(Value::Array(types)) = map.get("type") {
        let kept: Vec<Value> = types
            .iter()
            .filter(|t| t.as_str() != Some("null"))
            .cloned()
            .collect();
        let replacement = if kept.len() == 1 {
            kept[0].clone()
        } else {
            Value::Array(kept)
        };
        map.insert("type".to_string(), replacement);
    }

    if let Some(Value::Array(branches)) = map.get("anyOf") {
        let kept: Vec<Value> = branches
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) != Some("null"))
            .cloned()
            .collect();
        if kept.len() == 1 {
            map.remove("anyOf");
            if let Value::Object(inner) = &kept[0] {
                for (key, value) in inner {
                    map.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        } else {
            map.insert("anyOf".to_string(), Value::Array(kept));
        }
    }

    if map.get("default").is_some_and(Value::is_null) {
        map.remove("default");
    }

    for value in map.values_mut() {
        drop_null_branches(value);
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Follow local `$ref`s and single-branch `allOf` wrappers to the schema
/// that actually describes the value.
fn resolve_ref<'a>(mut schema: &'a Value, root: &'a Value) -> &'a Value {
    for _ in 0..8 {
        if let Some(target) = schema
            .get("$ref")
            .and_then(|v| v.as_str())
            .and_then(|r| r.strip_prefix('#'))
            .and_then(|pointer| root.pointer(pointer))
        {
            schema = target;
            continue;
        }
        match schema.get("allOf").and_then(|v| v.as_array()) {
            Some(branches) if branches.len() == 1 => schema = &branches[0],
            _ => break,
        }
    }
    schema
}

fn schema_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
        _ => Vec::new(),
    }
}

/// Turn string scalars into the number or boolean the schema asks for.
fn coerce(value: &mut Value, schema: &Value, root: &Value) {
    let schema = resolve_ref(schema, root);
    match value {
        Value::String(text) => {
            if let Some(coerced) = coerce_scalar(text, &schema_types(schema)) {
                *value = coerced;
            }
        }
        Value::Object(map) => {
            if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
                for (key, child) in map.iter_mut() {
                    if let Some(child_schema) = props.get(key) {
                        coerce(child, child_schema, root);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items.iter_mut() {
                    coerce(item, item_schema, root);
                }
            }
        }
        _ => {}
    }
}

fn coerce_scalar(text: &str, types: &[&str]) -> Option<Value> {
    if types.is_empty() || types.contains(&"string") {
        return None;
    }
    let trimmed = text.trim();
    if types.contains(&"integer") || types.contains(&"number") {
        if let Ok(int) = trimmed.parse::<i64>() {
            return Some(Value::from(int));
        }
        if let Ok(int) = trimmed.parse::<u64>() {
            return Some(Value::from(int));
        }
    }
    if types.contains(&"number") {
        if let Ok(float) = trimmed.parse::<f64>() {
            if let Some(number) = serde_json::Number::from_f64(float) {
                return Some(Value::Number(number));
            }
        }
    }
    if types.contains(&"boolean") {
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return Some(Value::Bool(true)),
            "false" => return Some(Value::Bool(false)),
            _ => {}
        }
    }
    None
}

fn pointer_to_field(pointer: &str) -> String {
    let mut out = String::new();
    for segment in pointer.split('/').filter(|s| !s.is_empty()) {
        if segment.chars().all(|c| c.is_ascii_digit()) {
            out.push_str(&format!("[{}]", segment));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&segment.replace("~1", "/").replace("~0", "~"));
        }
    }
    out
}

fn violation_from(err: &ValidationError<'_>) -> Violation {
    let base = pointer_to_field(&err.instance_path.to_string());
    let field = |name: &str| -> String {
        if base.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", base, name)
        }
    };
    let at = if base.is_empty() {
        "(root)".to_string()
    } else {
        base.clone()
    };
    match &err.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            Violation::new(field(&name), "is required")
        }
        ValidationErrorKind::Type { kind } => {
            Violation::new(at, format!("expected {}", format_type_kind(kind)))
        }
        ValidationErrorKind::Enum { options } => {
            let allowed: Vec<String> = options
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            Violation::new(at, format!("expected one of {}", allowed.join(", ")))
        }
        _ => Violation::new(at, err.to_string()),
    }
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

/// All violations go into `details`; the message lists the first
/// `MAX_REPORTED_VIOLATIONS` and counts the rest.
fn invalid_attributes(operation: Operation, violations: Vec<Violation>) -> ToolError {
    let mut lines = vec![format!("Invalid attributes for {}:", operation)];
    lines.extend(
        violations
            .iter()
            .take(limits::MAX_REPORTED_VIOLATIONS)
            .map(|v| format!("- {}: {}", v.field, v.message)),
    );
    let omitted = violations
        .len()
        .saturating_sub(limits::MAX_REPORTED_VIOLATIONS);
    if omitted > 0 {
        lines.push(format!("- (+{} more, see details.violations)", omitted));
    }
    ToolError::invalid_params(lines.join("\n"))
        .with_hint(format!(
            "Call tools_parameters with action=get and operation={} for the full schema.",
            operation
        ))
        .with_details(serde_json::json!({
            "operation": operation.as_str(),
            "violation_count": violations.len(),
            "violations": violations,
        }))
}

fn unknown_operation(name: &str) -> ToolError {
    let known: Vec<String> = Operation::ALL.iter().map(|op| op.as_str().to_string()).collect();
    let suggestions = suggest(name, &known, 3);
    let mut hint = format!("Known operations: {}.", known.join(", "));
    if !suggestions.is_empty() {
        hint = format!("Did you mean: {}? {}", suggestions.join(", "), hint);
    }
    ToolError::not_found(format!("Unknown operation '{}'", name.trim()))
        .with_hint(hint)
        .with_details(serde_json::json!({
            "known_operations": known,
            "did_you_mean": suggestions,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("goals_delete"), None);
    }

    #[test]
    fn duplicate_registration_is_a_configuration_error() {
        let err = ParameterRegistry::builder()
            .register::<GoalCreateAttributes>(Operation::GoalsCreate)
            .and_then(|b| b.register::<GoalCreateAttributes>(Operation::GoalsCreate))
            .err()
            .expect("duplicate must fail");
        assert_eq!(err.code, "CONFIGURATION_ERROR");
    }

    #[test]
    fn nullable_branches_are_flattened() {
        let mut schema = json!({
            "properties": {
                "a": {"type": ["string", "null"]},
                "b": {"anyOf": [{"$ref": "#/definitions/P"}, {"type": "null"}], "description": "d"}
            }
        });
        drop_null_branches(&mut schema);
        assert_eq!(schema["properties"]["a"]["type"], "string");
        assert_eq!(schema["properties"]["b"]["$ref"], "#/definitions/P");
        assert!(schema["properties"]["b"].get("anyOf").is_none());
    }

    #[test]
    fn pointers_render_as_dotted_fields() {
        assert_eq!(pointer_to_field("/pattern/type"), "pattern.type");
        assert_eq!(pointer_to_field("/urls/2"), "urls[2]");
        assert_eq!(pointer_to_field(""), "");
    }

    #[test]
    fn scalars_follow_schema_types() {
        assert_eq!(coerce_scalar("10", &["integer"]), Some(json!(10)));
        assert_eq!(coerce_scalar("2.5", &["number"]), Some(json!(2.5)));
        assert_eq!(coerce_scalar("TRUE", &["boolean"]), Some(json!(true)));
        assert_eq!(coerce_scalar("10", &["string"]), None);
        assert_eq!(coerce_scalar("ten", &["integer"]), None);
    }
}
