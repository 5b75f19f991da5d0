use piwik_pro_mcp::errors::ToolErrorKind;
use piwik_pro_mcp::services::parameters::{Operation, ParameterRegistry};
use serde_json::{json, Value};

fn registry() -> ParameterRegistry {
    ParameterRegistry::standard().expect("standard registry builds")
}

fn violation_fields(err: &piwik_pro_mcp::errors::ToolError) -> Vec<String> {
    err.details
        .as_ref()
        .and_then(|d| d.get("violations"))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("field").and_then(|f| f.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn every_operation_is_registered() {
    let registry = registry();
    let listed = registry.operations();
    for op in Operation::ALL {
        assert!(listed.contains(&op.as_str()), "{} must be listed", op);
        assert!(registry.schema(op).is_some());
    }
}

#[test]
fn empty_goal_reports_all_missing_fields_at_once() {
    let err = registry()
        .validate(Operation::GoalsCreate, &json!({}))
        .unwrap_err();
    assert_eq!(err.kind, ToolErrorKind::InvalidParams);
    let fields = violation_fields(&err);
    for expected in ["name", "trigger", "revenue"] {
        assert!(fields.contains(&expected.to_string()), "missing {} in {:?}", expected, fields);
        assert!(err.message.contains(&format!("- {}: is required", expected)));
    }
    assert!(err.hint.as_deref().unwrap_or("").contains("operation=goals_create"));
}

#[test]
fn published_required_list_matches_enforcement() {
    let registry = registry();
    for op in Operation::ALL {
        let mut required = registry.required_fields(op);
        required.sort();
        let mut enforced = match registry.validate(op, &json!({})) {
            Ok(_) => Vec::new(),
            Err(err) => violation_fields(&err),
        };
        enforced.sort();
        assert_eq!(required, enforced, "required fields drift for {}", op);
    }
}

#[test]
fn defaults_are_applied_and_unknown_keys_dropped() {
    let normalized = registry()
        .validate(
            Operation::AnnotationsCreate,
            &json!({"content": "Release 2.0", "date": "2024-03-01", "colour": "red"}),
        )
        .expect("valid");
    assert_eq!(normalized["visibility"], "private");
    assert!(normalized.get("colour").is_none());
}

#[test]
fn string_scalars_are_coerced() {
    let normalized = registry()
        .validate(
            Operation::GoalsCreate,
            &json!({"name": "Signup", "trigger": "url", "revenue": "10", "allow_multiple": "true"}),
        )
        .expect("valid");
    assert_eq!(normalized["revenue"].as_f64(), Some(10.0));
    assert_eq!(normalized["allow_multiple"], Value::Bool(true));
}

#[test]
fn null_attributes_are_treated_as_absent() {
    let normalized = registry()
        .validate(
            Operation::GoalsUpdate,
            &json!({"name": "Renamed", "description": null}),
        )
        .expect("valid");
    assert_eq!(normalized, json!({"name": "Renamed"}));

    let listed = registry()
        .validate(Operation::AnnotationsList, &Value::Null)
        .expect("defaults");
    assert_eq!(listed["limit"], 10);
    assert_eq!(listed["offset"], 0);
}

#[test]
fn cross_field_rules_name_the_offending_field() {
    let err = registry()
        .validate(
            Operation::AnnotationsList,
            &json!({"date_from": ["2024-01-01", "2024-02-01"], "date_to": ["2024-01-31"]}),
        )
        .unwrap_err();
    assert_eq!(violation_fields(&err), vec!["date_to".to_string()]);

    let err = registry()
        .validate(
            Operation::AnnotationsCreate,
            &json!({"content": "x", "date": "2024-02-30"}),
        )
        .unwrap_err();
    assert_eq!(violation_fields(&err), vec!["date".to_string()]);
}

#[test]
fn nested_and_indexed_fields_are_named() {
    let err = registry()
        .validate(
            Operation::GoalsCreate,
            &json!({
                "name": "Signup",
                "trigger": "url",
                "revenue": 0,
                "pattern": {"type": "regex", "value": "("}
            }),
        )
        .unwrap_err();
    assert_eq!(violation_fields(&err), vec!["pattern.value".to_string()]);

    let err = registry()
        .validate(
            Operation::AppsCreate,
            &json!({"name": "Shop", "urls": ["https://shop.example", "not a url"]}),
        )
        .unwrap_err();
    assert_eq!(violation_fields(&err), vec!["urls[1]".to_string()]);
}

#[test]
fn enum_violations_list_allowed_values() {
    let err = registry()
        .validate(
            Operation::GoalsCreate,
            &json!({"name": "Signup", "trigger": "pageview", "revenue": 0}),
        )
        .unwrap_err();
    assert!(err.message.contains("trigger: expected one of"));
    assert!(err.message.contains("event_name"));
}

#[test]
fn unknown_operation_names() {
    let registry = registry();
    let err = registry.schema_for("goal_create").unwrap_err();
    assert_eq!(err.kind, ToolErrorKind::NotFound);
    assert!(err.hint.as_deref().unwrap_or("").contains("goals_create"));

    let err = registry.validate_named("goals_archive", &json!({})).unwrap_err();
    assert_eq!(err.kind, ToolErrorKind::Configuration);
}

#[test]
fn published_schemas_have_no_null_types() {
    let registry = registry();
    for op in Operation::ALL {
        let rendered = registry.schema(op).expect("schema").to_string();
        assert!(!rendered.contains("\"null\""), "{} still publishes null", op);
    }
}

#[test]
fn model_rules_are_reported_alongside_schema_violations() {
    let err = registry()
        .validate(
            Operation::GoalsCreate,
            &json!({"trigger": "url", "revenue": 1, "pattern": {"type": "regex", "value": "("}}),
        )
        .unwrap_err();
    assert_eq!(
        violation_fields(&err),
        vec!["name".to_string(), "pattern.value".to_string()]
    );
    assert!(err.message.contains("- name: is required"));
    assert!(err.message.contains("- pattern.value: is not a valid regular expression"));

    let err = registry()
        .validate(Operation::AnnotationsCreate, &json!({"date": "2024-02-30"}))
        .unwrap_err();
    let fields = violation_fields(&err);
    assert!(fields.contains(&"content".to_string()), "{:?}", fields);
    assert!(fields.contains(&"date".to_string()), "{:?}", fields);
    assert_eq!(fields.len(), 2);
}

#[test]
fn overflowing_violations_are_counted_not_dropped() {
    let urls: Vec<String> = (0..60).map(|i| format!("not a url {}", i)).collect();
    let err = registry()
        .validate(Operation::AppsCreate, &json!({"name": "Shop", "urls": urls}))
        .unwrap_err();

    assert!(err.message.contains("- (+10 more, see details.violations)"));
    assert!(err.message.contains("- urls[49]:"));
    assert!(!err.message.contains("- urls[50]:"));

    let details = err.details.as_ref().expect("details");
    assert_eq!(details["violation_count"], 60);
    let fields = violation_fields(&err);
    assert_eq!(fields.len(), 60);
    assert_eq!(fields.last().map(String::as_str), Some("urls[59]"));
}
