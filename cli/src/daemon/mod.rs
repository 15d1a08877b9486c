// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Gateway daemon
//!
//! Handles:
//! - Serving the gateway HTTP API
//! - HTTP health checks against a running gateway
//! - Graceful shutdown

use anyhow::Result;
use std::time::Duration;

pub mod client;
pub mod server;

pub use client::GatewayClient;
pub use server::start_gateway;

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayStatus {
    Running { uptime: Option<u64>, agents: Option<u64> },
    Stopped,
    Unhealthy { error: String },
}

pub fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Probe `GET /health` with a short timeout.
pub async fn check_gateway_running(host: &str, port: u16) -> Result<GatewayStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    let health_url = format!("{}/health", base_url(host, port));
    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body = resp.json::<serde_json::Value>().await.ok();
            Ok(GatewayStatus::Running {
                uptime: body.as_ref().and_then(|v| v["uptime_seconds"].as_u64()),
                agents: body.as_ref().and_then(|v| v["agents"].as_u64()),
            })
        }
        Ok(resp) => Ok(GatewayStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) if e.is_connect() || e.is_timeout() => Ok(GatewayStatus::Stopped),
        Err(e) => Ok(GatewayStatus::Unhealthy { error: e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_accepts_bare_hosts_and_urls() {
        assert_eq!(base_url("127.0.0.1", 8000), "http://127.0.0.1:8000");
        assert_eq!(base_url("https://gw.local/", 443), "https://gw.local:443");
    }

    #[tokio::test]
    async fn closed_port_reads_as_stopped() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let status = check_gateway_running("127.0.0.1", port).await.unwrap();
        assert_eq!(status, GatewayStatus::Stopped);
    }
}
