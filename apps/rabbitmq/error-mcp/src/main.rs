//! RabbitMQ Error MCP
//!
//! Serves the RabbitMQ inspection tools over MCP stdio, or runs a single
//! tool from the command line against the same management API.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv, RabbitMqConfig};
use eyre::{Result, WrapErr};
use rabbitmq_mcp::{BrokerApi, ManagementClient, McpHandler, McpServer};
use tracing::info;

#[derive(Parser)]
#[command(name = "rabbitmq-error-mcp")]
#[command(about = "Inspect RabbitMQ error queues and republish failed MassTransit messages")]
struct Cli {
    /// Management API base URL (overrides RABBITMQ_MANAGEMENT_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Management API user (overrides RABBITMQ_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Default virtual host (overrides RABBITMQ_VHOST)
    #[arg(long, global = true)]
    vhost: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdin/stdout (default)
    Serve,

    /// List error and skipped queues
    Queues {
        /// Show every queue, not just _error and _skipped ones
        #[arg(short, long)]
        all: bool,
    },

    /// Show failed messages from an error queue without removing them
    Inspect {
        /// Error or skipped queue name
        queue: String,

        /// Number of messages to show (1-50)
        #[arg(short, long, default_value_t = 5)]
        count: u32,
    },

    /// Republish messages from an error queue (preview unless --confirm)
    Republish {
        /// Error queue name
        error_queue: String,

        /// Number of messages (1-50)
        #[arg(short, long, default_value_t = 10)]
        count: u32,

        /// Actually consume and republish
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let config = RabbitMqConfig::from_env()?.with_overrides(cli.url, cli.user, cli.vhost);
    info!(config = ?config, "Loaded RabbitMQ configuration");

    let client = ManagementClient::new(config.management_url.clone())
        .with_credentials(config.username.clone(), config.password.clone())
        .with_timeout(config.timeout)
        .init()
        .wrap_err("Failed to build management client")?;
    let broker: Arc<dyn BrokerApi> = Arc::new(client);
    let handler = McpHandler::new(broker, config.vhost.clone());

    let (tool, arguments) = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!(url = %config.management_url, "Starting RabbitMQ MCP server on stdio");
            McpServer::new(handler).run_stdio().await?;
            return Ok(());
        }
        Commands::Queues { all } => {
            let tool = if all { "list_queues" } else { "list_error_queues" };
            (tool, serde_json::json!({ "vhost": config.vhost }))
        }
        Commands::Inspect { queue, count } => (
            "get_error_messages",
            serde_json::json!({ "queue": queue, "count": count }),
        ),
        Commands::Republish {
            error_queue,
            count,
            confirm,
        } => (
            "republish_from_error",
            serde_json::json!({
                "error_queue": error_queue,
                "count": count,
                "confirm": confirm
            }),
        ),
    };

    let output = handler
        .call_tool(tool, arguments)
        .await
        .wrap_err_with(|| format!("{tool} failed"))?;
    print!("{output}");

    Ok(())
}
