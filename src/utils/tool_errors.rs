use crate::errors::ToolError;
use crate::utils::suggest::suggest;
use serde_json::Value;

pub fn unknown_action_error(tool: &str, action: Option<&Value>, known_actions: &[&str]) -> ToolError {
    let action_value = action
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let known: Vec<String> = known_actions.iter().map(|s| s.to_string()).collect();
    let suggestions = if action_value.is_empty() {
        Vec::new()
    } else {
        suggest(&action_value, &known, 3)
    };

    let mut hint = format!("Use one of: {}.", known.join(", "));
    if !suggestions.is_empty() {
        hint = format!("Did you mean: {}? {}", suggestions.join(", "), hint);
    }

    let message = if action_value.is_empty() {
        format!("{}: action is required", tool)
    } else {
        format!("Unknown {} action: {}", tool, action_value)
    };
    ToolError::invalid_params(message)
        .with_hint(hint)
        .with_details(serde_json::json!({
            "known_actions": known,
            "did_you_mean": suggestions,
        }))
}
