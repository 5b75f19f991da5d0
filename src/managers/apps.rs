use crate::constants::api::APPS_BASE;
use crate::constants::limits;
use crate::errors::ToolError;
use crate::services::api_client::ApiClient;
use crate::services::logger::Logger;
use crate::services::parameters::{Operation, ParameterRegistry};
use crate::services::validation::Validation;
use crate::utils::jsonapi::envelope;
use crate::utils::tool_errors::unknown_action_error;
use serde_json::{Map, Value};
use std::sync::Arc;

const APP_TYPE: &str = "ppms/app";
const APP_ACTIONS: &[&str] = &["list", "get", "create", "update", "delete"];

/// Attribute names that differ between the tool surface and the apps API.
const WIRE_NAMES: &[(&str, &str)] = &[
    ("app_type", "appType"),
    ("real_time_dashboards", "realTimeDashboards"),
];

#[derive(Clone)]
pub struct AppsManager {
    logger: Logger,
    validation: Validation,
    api: Arc<ApiClient>,
    parameters: Arc<ParameterRegistry>,
}

impl AppsManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        api: Arc<ApiClient>,
        parameters: Arc<ParameterRegistry>,
    ) -> Self {
        Self {
            logger: logger.child("apps"),
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
            _ => Err(unknown_action_error("apps", action, APP_ACTIONS)),
        }
    }

    fn app_id(&self, args: &Value) -> Result<String, ToolError> {
        self.validation.ensure_identifier(args.get("app_id"), "app_id")
    }

    fn app_path(app_id: &str) -> String {
        format!("{}/{}", APPS_BASE, app_id)
    }

    async fn list(&self, args: &Value) -> Result<Value, ToolError> {
        let search = self
            .validation
            .ensure_optional_string(args.get("search"), "search", true)?;
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
            "search": search,
            "limit": limit.unwrap_or(u64::from(limits::LIST_LIMIT_DEFAULT)),
            "offset": offset.unwrap_or(0),
        });

        let listed = self
            .api
            .get(APPS_BASE, Some(&query))
            .await
            .map_err(|err| ToolError::from(err).with_context("Listing apps"))?;
        Ok(listed.unwrap_or_else(|| serde_json::json!({ "data": [] })))
    }

    async fn get(&self, args: &Value) -> Result<Value, ToolError> {
        let app_id = self.app_id(args)?;
        let found = self
            .api
            .get(&Self::app_path(&app_id), None)
            .await
            .map_err(|err| ToolError::from(err).with_context(format!("App '{}'", app_id)))?;
        Ok(found.unwrap_or(Value::Null))
    }

    async fn create(&self, args: &Value) -> Result<Value, ToolError> {
        let attributes = self.parameters.validate(
            Operation::AppsCreate,
            args.get("attributes").unwrap_or(&Value::Null),
        )?;
        let name = attributes
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let body = envelope(APP_TYPE, None, to_wire_attributes(attributes));

        let created = self.api.post(APPS_BASE, &body).await.map_err(|err| {
            ToolError::from(err).with_context(format!("Creating app '{}'", name))
        })?;
        self.logger
            .info("app created", Some(&serde_json::json!({ "name": name })));
        Ok(created.unwrap_or(Value::Null))
    }

    async fn update(&self, args: &Value) -> Result<Value, ToolError> {
        let app_id = self.app_id(args)?;
        let attributes = self.parameters.validate(
            Operation::AppsUpdate,
            args.get("attributes").unwrap_or(&Value::Null),
        )?;
        let body = envelope(APP_TYPE, Some(&app_id), to_wire_attributes(attributes));

        let updated = self
            .api
            .patch(&Self::app_path(&app_id), &body)
            .await
            .map_err(|err| {
                ToolError::from(err).with_context(format!("Updating app '{}'", app_id))
            })?;
        Ok(updated.unwrap_or(Value::Null))
    }

    async fn delete(&self, args: &Value) -> Result<Value, ToolError> {
        let app_id = self.app_id(args)?;
        self.api
            .delete(&Self::app_path(&app_id), None)
            .await
            .map_err(|err| {
                ToolError::from(err).with_context(format!("Deleting app '{}'", app_id))
            })?;
        self.logger
            .info("app deleted", Some(&serde_json::json!({ "app_id": app_id })));
        Ok(serde_json::json!({ "deleted": true, "app_id": app_id }))
    }
}

fn to_wire_attributes(attributes: Value) -> Value {
    let Value::Object(map) = attributes else {
        return attributes;
    };
    let renamed: Map<String, Value> = map
        .into_iter()
        .map(|(key, value)| {
            let wire = WIRE_NAMES
                .iter()
                .find(|(local, _)| *local == key)
                .map(|(_, wire)| wire.to_string())
                .unwrap_or(key);
            (wire, value)
        })
        .collect();
    Value::Object(renamed)
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for AppsManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.handle_action(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::to_wire_attributes;
    use serde_json::json;

    #[test]
    fn snake_case_attributes_are_renamed() {
        let out = to_wire_attributes(json!({
            "name": "Shop",
            "app_type": "web",
            "real_time_dashboards": true
        }));
        assert_eq!(out, json!({"name": "Shop", "appType": "web", "realTimeDashboards": true}));
    }
}
