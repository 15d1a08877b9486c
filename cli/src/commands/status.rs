// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use colored::Colorize;

use crate::daemon::{check_gateway_running, GatewayStatus};

pub async fn show_status(host: &str, port: u16) -> Result<()> {
    match check_gateway_running(host, port).await? {
        GatewayStatus::Running { uptime, agents } => {
            println!("{}", format!("✓ Gateway is running on {}:{}", host, port).green());
            if let Some(uptime) = uptime {
                println!("  Uptime: {}s", uptime);
            }
            if let Some(agents) = agents {
                println!("  Agents: {}", agents);
            }
        }
        GatewayStatus::Unhealthy { error } => {
            println!("{}", format!("⚠ Gateway is reachable but unhealthy: {}", error).yellow());
        }
        GatewayStatus::Stopped => {
            println!("{}", "Gateway is not running".red());
            println!("Run 'mesh serve' to start it.");
        }
    }
    Ok(())
}
