use crate::errors::ToolError;
use crate::services::parameters::ParameterRegistry;
use crate::services::validation::Validation;
use crate::utils::tool_errors::unknown_action_error;
use serde_json::Value;
use std::sync::Arc;

const PARAMETERS_ACTIONS: &[&str] = &["get", "list"];

/// Serves the attribute schemas so callers can discover what an operation
/// accepts before sending it.
#[derive(Clone)]
pub struct ParametersManager {
    validation: Validation,
    parameters: Arc<ParameterRegistry>,
}

impl ParametersManager {
    pub fn new(validation: Validation, parameters: Arc<ParameterRegistry>) -> Self {
        Self {
            validation,
            parameters,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action");
        match action.and_then(|v| v.as_str()).unwrap_or("") {
            "get" => self.get(&args),
            "list" => Ok(serde_json::json!({ "operations": self.parameters.operations() })),
            _ => Err(unknown_action_error(
                "tools_parameters",
                action,
                PARAMETERS_ACTIONS,
            )),
        }
    }

    fn get(&self, args: &Value) -> Result<Value, ToolError> {
        let operation = self.validation.ensure_string(
            args.get("operation").unwrap_or(&Value::Null),
            "operation",
            true,
        )?;
        let schema = self.parameters.schema_for(&operation)?;
        Ok(serde_json::json!({ "operation": operation, "schema": schema }))
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for ParametersManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.handle_action(args).await
    }
}
