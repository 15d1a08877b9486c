// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use uuid::Uuid;

use mesh_gateway_core::run::{RunRecord, RunState};

use crate::daemon::GatewayClient;

#[derive(Subcommand)]
pub enum RunCommand {
    /// Route text to an agent and wait for the result
    Create {
        #[arg(value_name = "AGENT")]
        agent: String,

        #[arg(value_name = "TEXT")]
        text: String,

        /// Continue an existing session
        #[arg(long, value_name = "SESSION_ID")]
        session: Option<Uuid>,

        /// Open a new session for this run
        #[arg(long)]
        stateful: bool,
    },

    /// Show a run
    Get {
        #[arg(value_name = "RUN_ID")]
        run_id: Uuid,

        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent runs
    List {
        #[arg(long)]
        agent: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Cancel a run that has not finished
    Cancel {
        #[arg(value_name = "RUN_ID")]
        run_id: Uuid,
    },

    /// Follow a run's state changes until it finishes
    Watch {
        #[arg(value_name = "RUN_ID")]
        run_id: Uuid,
    },
}

pub async fn handle_command(command: RunCommand, client: GatewayClient) -> Result<()> {
    match command {
        RunCommand::Create {
            agent,
            text,
            session,
            stateful,
        } => {
            let run = client.create_run(&agent, &text, session, stateful).await?;
            print_run(&run);
            Ok(())
        }
        RunCommand::Get { run_id, json } => {
            let run = client.get_run(run_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_run(&run);
            }
            Ok(())
        }
        RunCommand::List { agent, limit } => list_runs(agent.as_deref(), limit, client).await,
        RunCommand::Cancel { run_id } => {
            let run = client.cancel_run(run_id).await?;
            println!("{}", format!("✓ Run {} {}", run.id, run.state()).green());
            Ok(())
        }
        RunCommand::Watch { run_id } => client.watch_run(run_id, print_event).await,
    }
}

fn colored_state(state: RunState) -> colored::ColoredString {
    match state {
        RunState::Completed => state.as_str().green(),
        RunState::Failed => state.as_str().red(),
        RunState::Cancelled => state.as_str().yellow(),
        RunState::Created | RunState::InProgress => state.as_str().cyan(),
    }
}

fn print_run(run: &RunRecord) {
    println!("{} {}", "Run:".bold(), run.id);
    println!("  Agent:   {}", run.agent_name);
    println!("  State:   {}", colored_state(run.state()));
    if let Some(session_id) = &run.session_id {
        println!("  Session: {}", session_id);
    }
    if let Some(output) = run.output_text() {
        println!("  Output:  {}", output);
    }
    if let Some(error) = &run.error {
        println!("  Error:   {}", error.to_string().red());
    }
}

async fn list_runs(agent: Option<&str>, limit: usize, client: GatewayClient) -> Result<()> {
    let runs = client.list_runs(agent, limit).await?;
    if runs.is_empty() {
        println!("{}", "No runs found".yellow());
        return Ok(());
    }

    println!("{:<38} {:<24} {:<12} CREATED", "ID", "AGENT", "STATE");
    for run in runs {
        println!(
            "{:<38} {:<24} {:<12} {}",
            run.id,
            run.agent_name,
            colored_state(run.state()),
            run.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn print_event(event: &Value) {
    let state = event
        .get("state")
        .or_else(|| event.get("to"))
        .and_then(Value::as_str)
        .unwrap_or("?");
    let at = event.get("at").and_then(Value::as_str).unwrap_or("");
    println!("{} {}", at.dimmed(), state.bold());
}
