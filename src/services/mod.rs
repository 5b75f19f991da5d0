pub mod api_client;
pub mod logger;
pub mod parameters;
pub mod token_manager;
pub mod tool_executor;
pub mod validation;
