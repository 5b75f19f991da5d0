use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::limits;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::utils::redact::redact_object;
use crate::utils::suggest::suggest;

use serde_json::Value;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn has_handler(&self, tool: &str) -> bool {
        self.handlers.contains_key(tool)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn wrap_result(
        &self,
        tool: &str,
        args: &Value,
        result: Value,
        trace_id: &str,
        started_at: i64,
    ) -> Value {
        serde_json::json!({
            "ok": true,
            "result": result,
            "meta": {
                "tool": tool,
                "action": args.get("action").cloned().unwrap_or(Value::Null),
                "trace_id": trace_id,
                "duration_ms": chrono::Utc::now().timestamp_millis() - started_at,
            },
        })
    }

    pub async fn execute(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let started_at = chrono::Utc::now().timestamp_millis();
        let Some(handler) = self.handlers.get(tool) else {
            let candidates: Vec<String> = self.handlers.keys().cloned().collect();
            let suggestions = suggest(tool, &candidates, 6);
            let hint = if suggestions.is_empty() {
                format!("Available tools: {}", self.tool_names().join(", "))
            } else {
                format!("Did you mean: {}", suggestions.join(", "))
            };
            return Err(
                ToolError::invalid_params(format!("Unknown tool: {}", tool)).with_hint(hint)
            );
        };

        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        let trace_id = args
            .get("trace_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.logger.debug(
            "tool call",
            Some(&serde_json::json!({
                "tool": tool,
                "trace_id": trace_id,
                "args": redact_object(&args, limits::LOG_ARGS_MAX_STRING),
            })),
        );

        let mut handler_args = args.clone();
        if let Value::Object(map) = &mut handler_args {
            map.remove("trace_id");
        }

        match handler.handle(handler_args).await {
            Ok(result) => {
                let payload = self.wrap_result(tool, &args, result, &trace_id, started_at);
                self.logger.info(
                    "tool call completed",
                    Some(&serde_json::json!({
                        "tool": tool,
                        "action": args.get("action"),
                        "trace_id": trace_id,
                        "duration_ms": payload["meta"]["duration_ms"],
                    })),
                );
                Ok(payload)
            }
            Err(err) => {
                self.logger.warn(
                    "tool call failed",
                    Some(&serde_json::json!({
                        "tool": tool,
                        "action": args.get("action"),
                        "trace_id": trace_id,
                        "code": err.code,
                        "duration_ms": chrono::Utc::now().timestamp_millis() - started_at,
                    })),
                );
                Err(err)
            }
        }
    }
}
