// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Demo worker replying `Processed: <text>`.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;

use mesh_agent_sdk::{process_fn, Callbacks, RunInput, RunOutput, WorkerConfig};

#[derive(Args)]
pub struct EchoAgentArgs {
    /// Agent name to register
    #[arg(long, default_value = "echo")]
    pub name: String,

    /// Gateway URL (PLATFORM_BASE_URL takes precedence)
    #[arg(long, value_name = "URL")]
    pub platform_url: Option<String>,

    /// Count turns in the session context
    #[arg(long)]
    pub count_turns: bool,

    /// Keep the registration when the worker exits
    #[arg(long)]
    pub keep_registered: bool,
}

pub fn echo_reply(input: &RunInput, count_turns: bool) -> RunOutput {
    let output = RunOutput::text(format!("Processed: {}", input.text()));
    if !count_turns {
        return output;
    }
    let turns = input
        .session_context
        .as_ref()
        .and_then(|c| c["turns"].as_u64())
        .unwrap_or(0);
    output.with_context(json!({ "turns": turns + 1 }))
}

pub async fn run_echo_agent(args: EchoAgentArgs) -> Result<()> {
    let callbacks = Callbacks::new()
        .on_register(|body| {
            let name = body["agent_name"].as_str().unwrap_or("agent");
            println!("{}", format!("✓ Registered {}", name).green());
        })
        .on_error(|e| eprintln!("{}", e.to_string().red()))
        .on_shutdown(|reason| println!("{}", format!("Shutting down ({})", reason).dimmed()));

    let config = WorkerConfig::new(
        args.name,
        "custom",
        vec!["text".to_string()],
        args.platform_url.as_deref(),
    )
    .with_description("Echoes its input")
    .with_callbacks(callbacks)
    .deregister_on_shutdown(!args.keep_registered);

    let count_turns = args.count_turns;
    let handler = process_fn(move |input: RunInput| Ok(echo_reply(&input, count_turns)));

    println!("Starting echo agent against {}", config.platform_url.bold());
    mesh_agent_sdk::start(config, handler).await?;
    Ok(())
}
