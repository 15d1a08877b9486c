// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Agent Mesh CLI
//!
//! The `mesh` binary runs the gateway and operates a running one.
//!
//! ## Commands
//!
//! - `mesh serve` - Run the gateway in the foreground
//! - `mesh status` - Check a running gateway
//! - `mesh agent list|show|remove|cleanup` - Registry operations
//! - `mesh run create|get|list|cancel|watch` - Run operations
//! - `mesh config show|validate|generate` - Configuration management
//! - `mesh echo-agent` - Start a demo worker

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use mesh_gateway::commands::{self, AgentCommand, ConfigCommand, EchoAgentArgs, RunCommand};
use mesh_gateway::daemon::{self, server::ServeOverrides, GatewayClient};

const DEFAULT_PORT: u16 = 8000;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Agent Mesh gateway - register, verify and route to agent workers
#[derive(Parser)]
#[command(name = "mesh")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "MESH_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Gateway port (serve: overrides the config file; others: target)
    #[arg(long, global = true, env = "MESH_PORT")]
    port: Option<u16>,

    /// Gateway host (serve: bind address; others: target)
    #[arg(long, global = true, env = "MESH_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MESH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "MESH_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    #[command(name = "serve")]
    Serve,

    /// Check whether a gateway is running
    #[command(name = "status")]
    Status,

    /// Agent registry operations
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Run operations
    #[command(name = "run")]
    Run {
        #[command(subcommand)]
        command: RunCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Start a demo worker that echoes its input
    #[command(name = "echo-agent")]
    EchoAgent(EchoAgentArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    let target_host = cli.host.clone().unwrap_or_else(|| "127.0.0.1".to_string());
    let target_port = cli.port.unwrap_or(DEFAULT_PORT);
    let client = || GatewayClient::new(daemon::base_url(&target_host, target_port));

    match cli.command {
        Some(Commands::Serve) => {
            info!("Starting Agent Mesh gateway");
            let overrides = ServeOverrides {
                host: cli.host,
                port: cli.port,
            };
            daemon::start_gateway(cli.config, overrides).await
        }
        Some(Commands::Status) => commands::status::show_status(&target_host, target_port).await,
        Some(Commands::Agent { command }) => commands::agent::handle_command(command, client()?).await,
        Some(Commands::Run { command }) => commands::run::handle_command(command, client()?).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::EchoAgent(args)) => commands::echo::run_echo_agent(args).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }

    Ok(())
}
