// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with a running gateway

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use uuid::Uuid;

use mesh_gateway_core::error::MeshError;
use mesh_gateway_core::protocol::{AgentList, AgentManifest};
use mesh_gateway_core::run::RunRecord;

#[derive(Debug, Clone, Default)]
pub struct AgentQuery {
    pub status: Option<String>,
    pub capability: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            // No global timeout; run events are long-lived streams
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Decode a success body, or turn a gateway error body into a readable error.
    async fn decode<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            let structured = serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|body| MeshError::from_body(&body));
            match structured {
                Some(error) => anyhow::bail!("Failed to {}: {}", action, error),
                None => anyhow::bail!("Failed to {} (HTTP {}): {}", action, status, error_text),
            }
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response to {}", action))
    }

    pub async fn list_agents(&self, query: &AgentQuery) -> Result<Vec<AgentManifest>> {
        let mut params = Vec::new();
        if let Some(status) = &query.status {
            params.push(("status", status.as_str()));
        }
        if let Some(capability) = &query.capability {
            params.push(("capability", capability.as_str()));
        }
        if let Some(kind) = &query.kind {
            params.push(("kind", kind.as_str()));
        }

        let response = self
            .client
            .get(format!("{}/agents", self.base_url))
            .query(&params)
            .send()
            .await
            .context("Failed to list agents")?;
        let list: AgentList = Self::decode(response, "list agents").await?;
        Ok(list.agents)
    }

    pub async fn get_agent(&self, name: &str) -> Result<AgentManifest> {
        let response = self
            .client
            .get(format!("{}/agents/{}", self.base_url, name))
            .send()
            .await
            .context("Failed to get agent")?;
        Self::decode(response, "get agent").await
    }

    pub async fn remove_agent(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/platform/agents/{}", self.base_url, name))
            .send()
            .await
            .context("Failed to remove agent")?;
        let _: Value = Self::decode(response, "remove agent").await?;
        Ok(())
    }

    /// Returns the number of removed agents.
    pub async fn cleanup_agents(&self) -> Result<u64> {
        let response = self
            .client
            .delete(format!("{}/platform/agents/cleanup", self.base_url))
            .send()
            .await
            .context("Failed to clean up agents")?;
        let body: Value = Self::decode(response, "clean up agents").await?;
        Ok(body["deleted_count"].as_u64().unwrap_or(0))
    }

    pub async fn create_run(
        &self,
        agent: &str,
        input: &str,
        session_id: Option<Uuid>,
        stateful: bool,
    ) -> Result<RunRecord> {
        let mut body = json!({
            "agent": agent,
            "input": [input],
            "stateful": stateful,
        });
        if let Some(session_id) = session_id {
            body["session_id"] = json!(session_id);
        }

        let response = self
            .client
            .post(format!("{}/runs", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Failed to create run")?;
        Self::decode(response, "create run").await
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<RunRecord> {
        let response = self
            .client
            .get(format!("{}/runs/{}", self.base_url, run_id))
            .send()
            .await
            .context("Failed to get run")?;
        Self::decode(response, "get run").await
    }

    pub async fn list_runs(&self, agent: Option<&str>, limit: usize) -> Result<Vec<RunRecord>> {
        let mut request = self
            .client
            .get(format!("{}/runs", self.base_url))
            .query(&[("limit", limit.to_string())]);
        if let Some(agent) = agent {
            request = request.query(&[("agent", agent)]);
        }
        let response = request.send().await.context("Failed to list runs")?;

        #[derive(serde::Deserialize)]
        struct RunList {
            runs: Vec<RunRecord>,
        }
        let list: RunList = Self::decode(response, "list runs").await?;
        Ok(list.runs)
    }

    pub async fn cancel_run(&self, run_id: Uuid) -> Result<RunRecord> {
        let response = self
            .client
            .post(format!("{}/runs/{}/cancel", self.base_url, run_id))
            .send()
            .await
            .context("Failed to cancel run")?;
        Self::decode(response, "cancel run").await
    }

    /// Follow `GET /runs/{id}/events`, handing each SSE `data:` payload to
    /// `on_event` until the gateway closes the stream.
    pub async fn watch_run<F>(&self, run_id: Uuid, mut on_event: F) -> Result<()>
    where
        F: FnMut(&Value),
    {
        let response = self
            .client
            .get(format!("{}/runs/{}/events", self.base_url, run_id))
            .send()
            .await
            .context("Failed to stream run events")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to stream run events: {}", error_text);
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read event stream chunk")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(end) = buffer.find('\n') {
                let line: String = buffer.drain(..=end).collect();
                if let Some(data) = line.trim_end().strip_prefix("data:") {
                    if let Ok(event) = serde_json::from_str::<Value>(data.trim_start()) {
                        on_event(&event);
                    }
                }
            }
        }

        Ok(())
    }
}
