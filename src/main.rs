use clap::Parser;
use piwik_pro_mcp::config::Config;
use piwik_pro_mcp::errors::ToolError;
use piwik_pro_mcp::services::api_client::ApiClient;
use piwik_pro_mcp::services::logger::{init_tracing, Logger};
use std::path::PathBuf;

/// MCP server exposing the Piwik PRO management APIs over stdio.
#[derive(Debug, Parser)]
#[command(name = "piwik-pro-mcp", version, about)]
struct Cli {
    /// Env-file to load before reading the environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Validate the configuration, exchange one token and exit.
    #[arg(long)]
    check_config: bool,
}

async fn check_config(config: &Config) -> Result<(), ToolError> {
    let api = ApiClient::new(Logger::new("piwik-pro-mcp"), config)?;
    api.tokens()
        .access_token()
        .await
        .map_err(|err| ToolError::from(err).with_context("Token exchange"))?;
    eprintln!(
        "piwik-pro-mcp: configuration ok {}",
        serde_json::to_string_pretty(&config.summary()).unwrap_or_default()
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ToolError> {
    let config = Config::load(cli.env_file.as_deref())?;
    if cli.check_config {
        return check_config(&config).await;
    }
    piwik_pro_mcp::mcp::server::run_stdio(config).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();
    if let Err(err) = run(cli).await {
        eprintln!("piwik-pro-mcp: {}", err);
        std::process::exit(1);
    }
}
