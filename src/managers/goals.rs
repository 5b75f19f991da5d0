use crate::constants::api::GOALS_BASE;
use crate::constants::limits;
use crate::errors::ToolError;
use crate::services::api_client::ApiClient;
use crate::services::logger::Logger;
use crate::services::parameters::{Operation, ParameterRegistry};
use crate::services::validation::Validation;
use crate::utils::jsonapi::{envelope, with_attribute};
use crate::utils::tool_errors::unknown_action_error;
use serde_json::{Map, Value};
use std::sync::Arc;

const GOAL_TYPE: &str = "Goal";
const GOAL_ACTIONS: &[&str] = &["list", "get", "create", "update", "delete"];

#[derive(Clone)]
pub struct GoalsManager {
    logger: Logger,
    validation: Validation,
    api: Arc<ApiClient>,
    parameters: Arc<ParameterRegistry>,
}

impl GoalsManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        api: Arc<ApiClient>,
        parameters: Arc<ParameterRegistry>,
    ) -> Self {
        Self {
            logger: logger.child("goals"),
            validation,
            api,
            parameters,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action");
        match action.and_then(|v| v.as_str()).unwrap_or("") {
            "list" => self.list(&args).await,
            "get" => self.get(&args).await,
            "create" => self.create(&args).await,
            "update" => self.update(&args).await,
            "delete" => self.delete(&args).await,
            _ => Err(unknown_action_error("analytics_goals", action, GOAL_ACTIONS)),
        }
    }

    fn goal_id(&self, args: &Value) -> Result<String, ToolError> {
        self.validation.ensure_identifier(args.get("goal_id"), "goal_id")
    }

    fn goal_path(goal_id: &str) -> String {
        format!("{}{}/", GOALS_BASE, goal_id)
    }

    async fn list(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let limit = self.validation.ensure_optional_u64(
            args.get("limit"),
            "limit",
            1,
            u64::from(limits::LIST_LIMIT_MAX),
        )?;
        let offset = self
            .validation
            .ensure_optional_u64(args.get("offset"), "offset", 0, u64::MAX)?;
        let query = serde_json::json!({
            "website_id": website_id,
            "limit": limit.unwrap_or(u64::from(limits::LIST_LIMIT_DEFAULT)),
            "offset": offset.unwrap_or(0),
        });

        let listed = self.api.get(GOALS_BASE, Some(&query)).await.map_err(|err| {
            ToolError::from(err).with_context(format!("Listing goals for website '{}'", website_id))
        })?;
        Ok(listed.unwrap_or_else(|| serde_json::json!({ "data": [] })))
    }

    async fn get(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let goal_id = self.goal_id(args)?;
        let query = serde_json::json!({ "website_id": website_id });
        let found = self
            .api
            .get(&Self::goal_path(&goal_id), Some(&query))
            .await
            .map_err(|err| ToolError::from(err).with_context(format!("Goal '{}'", goal_id)))?;
        Ok(found.unwrap_or(Value::Null))
    }

    async fn create(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let attributes = self.parameters.validate(
            Operation::GoalsCreate,
            args.get("attributes").unwrap_or(&Value::Null),
        )?;
        let attributes = with_attribute(
            to_wire_attributes(attributes),
            "website_id",
            Value::String(website_id.clone()),
        );
        let body = envelope(GOAL_TYPE, None, attributes);

        let created = self.api.post(GOALS_BASE, &body).await.map_err(|err| {
            ToolError::from(err).with_context(format!("Creating goal for website '{}'", website_id))
        })?;
        self.logger.info(
            "goal created",
            Some(&serde_json::json!({ "website_id": website_id })),
        );
        Ok(created.unwrap_or(Value::Null))
    }

    async fn update(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let goal_id = self.goal_id(args)?;
        let attributes = self.parameters.validate(
            Operation::GoalsUpdate,
            args.get("attributes").unwrap_or(&Value::Null),
        )?;
        let attributes = with_attribute(
            to_wire_attributes(attributes),
            "website_id",
            Value::String(website_id),
        );
        let body = envelope(GOAL_TYPE, Some(&goal_id), attributes);

        let updated = self
            .api
            .patch(&Self::goal_path(&goal_id), &body)
            .await
            .map_err(|err| {
                ToolError::from(err).with_context(format!("Updating goal '{}'", goal_id))
            })?;
        Ok(updated.unwrap_or(Value::Null))
    }

    async fn delete(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let goal_id = self.goal_id(args)?;
        let query = serde_json::json!({ "website_id": website_id });
        self.api
            .delete(&Self::goal_path(&goal_id), Some(&query))
            .await
            .map_err(|err| {
                ToolError::from(err).with_context(format!("Deleting goal '{}'", goal_id))
            })?;
        Ok(serde_json::json!({
            "deleted": true,
            "goal_id": goal_id,
            "website_id": website_id,
        }))
    }
}

/// The goals API keeps the matching rule flat on the resource:
/// `pattern_type`, `pattern` and `case_sensitive`.
fn to_wire_attributes(attributes: Value) -> Value {
    let Value::Object(mut map) = attributes else {
        return attributes;
    };
    if let Some(Value::Object(pattern)) = map.remove("pattern") {
        let mut pattern: Map<String, Value> = pattern;
        if let Some(kind) = pattern.remove("type") {
            map.insert("pattern_type".to_string(), kind);
        }
        if let Some(value) = pattern.remove("value") {
            map.insert("pattern".to_string(), value);
        }
        if let Some(case_sensitive) = pattern.remove("case_sensitive") {
            map.insert("case_sensitive".to_string(), case_sensitive);
        }
    }
    Value::Object(map)
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for GoalsManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.handle_action(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::to_wire_attributes;
    use serde_json::json;

    #[test]
    fn pattern_is_flattened_for_the_wire() {
        let out = to_wire_attributes(json!({
            "name": "Signup",
            "pattern": {"type": "contains", "value": "/thanks", "case_sensitive": false}
        }));
        assert_eq!(out["pattern_type"], "contains");
        assert_eq!(out["pattern"], "/thanks");
        assert_eq!(out["case_sensitive"], false);
        assert_eq!(out["name"], "Signup");
    }

    #[test]
    fn attributes_without_pattern_pass_through() {
        let input = json!({"name": "Signup", "revenue": 0.0});
        assert_eq!(to_wire_attributes(input.clone()), input);
    }
}
