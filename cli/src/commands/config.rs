// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use mesh_gateway_core::config::GatewayConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (YAML)
    Show,

    /// Validate a configuration file
    Validate {
        /// Path to config file (default: --config)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./mesh-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show => show(config_override),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    match &config_path {
        Some(path) => println!("{} {}", "# Source:".dimmed(), path.display()),
        None => println!("{}", "# Source: built-in defaults".dimmed()),
    }
    print!("{}", render(&config)?);
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    let Some(path) = config_path else {
        anyhow::bail!("No configuration file given; pass FILE or --config");
    };
    println!("Validating {}...", path.display());
    GatewayConfig::load(Some(path.as_path())).context("Configuration validation failed")?;
    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    let sample = render(&GatewayConfig::default())?;
    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;
    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}

fn render(config: &GatewayConfig) -> Result<String> {
    serde_yaml::to_string(config).context("Failed to serialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.yaml");
        generate(path.clone()).unwrap();

        let loaded = GatewayConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, GatewayConfig::default());
    }

    #[test]
    fn validate_requires_a_file() {
        assert!(validate(None).is_err());
    }
}
