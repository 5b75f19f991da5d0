use crate::constants::api::{SYSTEM_ANNOTATIONS_BASE, USER_ANNOTATIONS_BASE};
use crate::errors::ToolError;
use crate::services::api_client::ApiClient;
use crate::services::logger::Logger;
use crate::services::parameters::{Operation, ParameterRegistry};
use crate::services::validation::Validation;
use crate::utils::jsonapi::{envelope, with_attribute};
use crate::utils::tool_errors::unknown_action_error;
use serde_json::Value;
use std::sync::Arc;

const ANNOTATION_TYPE: &str = "UserAnnotation";
const ANNOTATION_ACTIONS: &[&str] = &["create", "list", "list_system", "get", "update", "delete"];

/// User annotations in Analytics. `website_id` travels in the attributes for
/// writes and as a query parameter for reads and deletes.
#[derive(Clone)]
pub struct AnnotationsManager {
    logger: Logger,
    validation: Validation,
    api: Arc<ApiClient>,
    parameters: Arc<ParameterRegistry>,
}

impl AnnotationsManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        api: Arc<ApiClient>,
        parameters: Arc<ParameterRegistry>,
    ) -> Self {
        Self {
            logger: logger.child("annotations"),
            validation,
            api,
            parameters,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action");
        match action.and_then(|v| v.as_str()).unwrap_or("") {
            "create" => self.create(&args).await,
            "list" => self.list(&args).await,
            "list_system" => self.list_system(&args).await,
            "get" => self.get(&args).await,
            "update" => self.update(&args).await,
            "delete" => self.delete(&args).await,
            _ => Err(unknown_action_error(
                "analytics_annotations",
                action,
                ANNOTATION_ACTIONS,
            )),
        }
    }

    fn annotation_id(&self, args: &Value) -> Result<String, ToolError> {
        self.validation
            .ensure_identifier(args.get("annotation_id"), "annotation_id")
    }

    fn attributes<'a>(&self, args: &'a Value) -> &'a Value {
        args.get("attributes").unwrap_or(&Value::Null)
    }

    async fn create(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let attributes = self
            .parameters
            .validate(Operation::AnnotationsCreate, self.attributes(args))?;
        let attributes = with_attribute(attributes, "website_id", Value::String(website_id.clone()));
        let body = envelope(ANNOTATION_TYPE, None, attributes);

        let created = self
            .api
            .post(USER_ANNOTATIONS_BASE, &body)
            .await
            .map_err(|err| {
                ToolError::from(err)
                    .with_context(format!("Creating annotation for website '{}'", website_id))
            })?;
        self.logger.info(
            "annotation created",
            Some(&serde_json::json!({ "website_id": website_id })),
        );
        Ok(created.unwrap_or(Value::Null))
    }

    async fn list(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let filters = self
            .parameters
            .validate(Operation::AnnotationsList, self.attributes(args))?;
        let query = with_attribute(filters, "website_id", Value::String(website_id.clone()));

        let listed = self
            .api
            .get(USER_ANNOTATIONS_BASE, Some(&query))
            .await
            .map_err(|err| {
                ToolError::from(err)
                    .with_context(format!("Listing annotations for website '{}'", website_id))
            })?;
        Ok(listed.unwrap_or_else(|| serde_json::json!({ "data": [] })))
    }

    async fn list_system(&self, args: &Value) -> Result<Value, ToolError> {
        let query = self
            .parameters
            .validate(Operation::AnnotationsList, self.attributes(args))?;
        let listed = self
            .api
            .get(SYSTEM_ANNOTATIONS_BASE, Some(&query))
            .await
            .map_err(|err| ToolError::from(err).with_context("Listing system annotations"))?;
        Ok(listed.unwrap_or_else(|| serde_json::json!({ "data": [] })))
    }

    async fn get(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let annotation_id = self.annotation_id(args)?;
        let path = format!("{}{}/", USER_ANNOTATIONS_BASE, annotation_id);
        let query = serde_json::json!({ "website_id": website_id });

        let found = self
            .api
            .get(&path, Some(&query))
            .await
            .map_err(|err| {
                ToolError::from(err).with_context(format!("Annotation '{}'", annotation_id))
            })?;
        Ok(found.unwrap_or(Value::Null))
    }

    async fn update(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let annotation_id = self.annotation_id(args)?;
        let attributes = self
            .parameters
            .validate(Operation::AnnotationsUpdate, self.attributes(args))?;
        let attributes = with_attribute(attributes, "website_id", Value::String(website_id));
        let body = envelope(ANNOTATION_TYPE, Some(&annotation_id), attributes);
        let path = format!("{}{}/", USER_ANNOTATIONS_BASE, annotation_id);

        let updated = self.api.patch(&path, &body).await.map_err(|err| {
            ToolError::from(err).with_context(format!("Updating annotation '{}'", annotation_id))
        })?;
        Ok(updated.unwrap_or(Value::Null))
    }

    async fn delete(&self, args: &Value) -> Result<Value, ToolError> {
        let website_id = self.validation.ensure_website_id(args)?;
        let annotation_id = self.annotation_id(args)?;
        let path = format!("{}{}/", USER_ANNOTATIONS_BASE, annotation_id);
        let query = serde_json::json!({ "website_id": website_id });

        self.api
            .delete(&path, Some(&query))
            .await
            .map_err(|err| {
                ToolError::from(err).with_context(format!("Deleting annotation '{}'", annotation_id))
            })?;
        self.logger.info(
            "annotation deleted",
            Some(&serde_json::json!({ "annotation_id": annotation_id })),
        );
        Ok(serde_json::json!({
            "deleted": true,
            "annotation_id": annotation_id,
            "website_id": website_id,
        }))
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for AnnotationsManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.handle_action(args).await
    }
}
