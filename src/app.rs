use crate::config::Config;
use crate::errors::ToolError;
use crate::managers::annotations::AnnotationsManager;
use crate::managers::apps::AppsManager;
use crate::managers::goals::GoalsManager;
use crate::managers::parameters::ParametersManager;
use crate::mcp::catalog::tool_catalog;
use crate::services::api_client::ApiClient;
use crate::services::logger::Logger;
use crate::services::parameters::ParameterRegistry;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::validation::Validation;
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub api: Arc<ApiClient>,
    pub parameters: Arc<ParameterRegistry>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(
        handlers: &HashMap<String, Arc<dyn ToolHandler>>,
    ) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in the catalog must have a registered handler.")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    pub fn initialize(config: &Config) -> Result<Self, ToolError> {
        let logger = Logger::new("piwik-pro-mcp");
        let validation = Validation::new();

        let api = Arc::new(ApiClient::new(logger.clone(), config)?);
        let parameters = Arc::new(ParameterRegistry::standard()?);

        let apps_manager = Arc::new(AppsManager::new(
            logger.clone(),
            validation.clone(),
            api.clone(),
            parameters.clone(),
        ));
        let goals_manager = Arc::new(GoalsManager::new(
            logger.clone(),
            validation.clone(),
            api.clone(),
            parameters.clone(),
        ));
        let annotations_manager = Arc::new(AnnotationsManager::new(
            logger.clone(),
            validation.clone(),
            api.clone(),
            parameters.clone(),
        ));
        let parameters_manager = Arc::new(ParametersManager::new(
            validation.clone(),
            parameters.clone(),
        ));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("apps".to_string(), apps_manager);
        handlers.insert("analytics_goals".to_string(), goals_manager);
        handlers.insert("analytics_annotations".to_string(), annotations_manager);
        handlers.insert("tools_parameters".to_string(), parameters_manager);

        Self::validate_tool_wiring(&handlers)?;

        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));

        Ok(Self {
            logger,
            api,
            parameters,
            tool_executor,
        })
    }
}
