// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Gateway HTTP server

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use mesh_gateway_core::{
    application::{repository_factory::RegistryStore, MeshGateway},
    config::GatewayConfig,
    infrastructure::HttpAgentClient,
    presentation::api,
};

/// Command-line overrides applied on top of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub fn load_config(config_path: Option<PathBuf>, overrides: &ServeOverrides) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = &overrides.host {
        config.network.bind_address = host.clone();
    }
    if let Some(port) = overrides.port {
        config.network.port = port;
    }
    Ok(config)
}

pub async fn start_gateway(config_path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    let config = load_config(config_path, &overrides)?;
    let addr = format!("{}:{}", config.network.bind_address, config.network.port);
    info!(
        verification_ms = config.timeouts.verification_ms,
        run_ms = config.timeouts.run_ms,
        health_enabled = config.health.enabled,
        "Configuration loaded"
    );

    let client = Arc::new(HttpAgentClient::new().context("Failed to create agent HTTP client")?);
    let gateway = Arc::new(MeshGateway::new(
        config,
        RegistryStore::in_memory(),
        client.clone(),
        client,
    ));
    let sweeper = gateway.start_background_tasks();

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Gateway listening on {}", addr);

    axum::serve(listener, api::app(gateway.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down");
    gateway.shutdown();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Session sweeper ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "network:\n  bind_address: 10.0.0.1\n  port: 9000\n").unwrap();

        let config = load_config(Some(file.path().to_path_buf()), &ServeOverrides::default()).unwrap();
        assert_eq!(config.network.port, 9000);

        let overrides = ServeOverrides {
            host: Some("127.0.0.1".into()),
            port: Some(7000),
        };
        let config = load_config(Some(file.path().to_path_buf()), &overrides).unwrap();
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.network.port, 7000);
    }
}
