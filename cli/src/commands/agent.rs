// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::daemon::client::AgentQuery;
use crate::daemon::GatewayClient;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List registered agents
    List {
        /// Only agents with this status (pending, active, inactive, error)
        #[arg(long)]
        status: Option<String>,

        /// Only agents advertising this capability
        #[arg(long)]
        capability: Option<String>,

        /// Only agents of this kind
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show an agent's manifest (YAML)
    Show {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Deregister an agent
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Deregister every agent
    Cleanup,
}

pub async fn handle_command(command: AgentCommand, client: GatewayClient) -> Result<()> {
    match command {
        AgentCommand::List {
            status,
            capability,
            kind,
        } => {
            let query = AgentQuery {
                status,
                capability,
                kind,
            };
            list_agents(&query, client).await
        }
        AgentCommand::Show { name } => show_agent(&name, client).await,
        AgentCommand::Remove { name } => remove_agent(&name, client).await,
        AgentCommand::Cleanup => cleanup_agents(client).await,
    }
}

async fn list_agents(query: &AgentQuery, client: GatewayClient) -> Result<()> {
    let agents = client.list_agents(query).await?;

    if agents.is_empty() {
        println!("{}", "No agents found".yellow());
        return Ok(());
    }

    println!("{} agents found:", agents.len());
    println!("{:<24} {:<12} {:<10} {:<10} CAPABILITIES", "NAME", "KIND", "VERSION", "STATUS");

    for agent in agents {
        let status = agent.status.map(|s| s.as_str()).unwrap_or("unknown");
        let status = match status {
            "active" => status.green(),
            "pending" => status.yellow(),
            _ => status.red(),
        };
        println!(
            "{:<24} {:<12} {:<10} {:<10} {}",
            agent.name.bold(),
            agent.kind.as_deref().unwrap_or("-"),
            agent.version,
            status,
            agent.capabilities.join(",")
        );
    }

    Ok(())
}

async fn show_agent(name: &str, client: GatewayClient) -> Result<()> {
    let manifest = client.get_agent(name).await?;
    println!("{}", serde_yaml::to_string(&manifest)?);
    Ok(())
}

async fn remove_agent(name: &str, client: GatewayClient) -> Result<()> {
    client.remove_agent(name).await?;
    println!("{}", format!("✓ Agent {} removed", name).green());
    Ok(())
}

async fn cleanup_agents(client: GatewayClient) -> Result<()> {
    let removed = client.cleanup_agents().await?;
    println!("{}", format!("✓ Removed {} agents", removed).green());
    Ok(())
}
