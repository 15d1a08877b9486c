// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for calling worker protocol servers
//!
//! | Call | Request |
//! |------|---------|
//! | verify | `GET {endpoint}/agents` |
//! | ping | `GET {endpoint}/ping` |
//! | invoke | `POST {endpoint}/runs` |
//! | cancel | `POST {endpoint}/runs/{run_id}/cancel` |
//!
//! Every request carries `Authorization: Bearer <credential>`.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use crate::domain::agent::AgentRecord;
use crate::domain::agent_client::{AgentCallError, AgentInvoker, AgentVerifier, CallErrorClass};
use crate::domain::protocol::{AgentList, AgentRunRequest, AgentRunResponse};
use crate::domain::run::RunId;

#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: Client,
}

impl HttpAgentClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        // No global timeout; callers bound each call
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn url(agent: &AgentRecord, path: &str) -> String {
        format!("{}{}", agent.endpoint, path)
    }

    async fn check_status(response: Response) -> Result<Response, AgentCallError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentCallError::new(
                CallErrorClass::AuthRejected,
                format!("agent rejected credential ({})", status),
            ),
            _ => AgentCallError::new(
                CallErrorClass::HttpStatus,
                format!("agent returned {}: {}", status, body),
            ),
        })
    }
}

fn transport_error(e: reqwest::Error) -> AgentCallError {
    let class = if e.is_timeout() {
        CallErrorClass::Timeout
    } else if e.is_connect() {
        CallErrorClass::ConnectionRefused
    } else if e.is_decode() {
        CallErrorClass::MalformedResponse
    } else {
        CallErrorClass::Transport
    };
    AgentCallError::new(class, e.to_string())
}

#[async_trait]
impl AgentVerifier for HttpAgentClient {
    async fn verify(&self, agent: &AgentRecord) -> Result<(), AgentCallError> {
        let response = self
            .client
            .get(Self::url(agent, "/agents"))
            .bearer_auth(&agent.credential)
            .send()
            .await
            .map_err(transport_error)?;

        // A protocol server without a manifest listing is still live
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let response = Self::check_status(response).await?;

        let listing: AgentList = response.json().await.map_err(|e| {
            AgentCallError::new(
                CallErrorClass::MalformedResponse,
                format!("invalid agent listing: {}", e),
            )
        })?;
        if !listing.agents.is_empty() && !listing.agents.iter().any(|m| m.name == agent.name.as_str()) {
            return Err(AgentCallError::new(
                CallErrorClass::MalformedResponse,
                format!("agent '{}' is not listed by its endpoint", agent.name),
            ));
        }
        Ok(())
    }

    async fn ping(&self, agent: &AgentRecord) -> Result<(), AgentCallError> {
        let response = self
            .client
            .get(Self::url(agent, "/ping"))
            .bearer_auth(&agent.credential)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentClient {
    async fn invoke(
        &self,
        agent: &AgentRecord,
        request: &AgentRunRequest,
    ) -> Result<AgentRunResponse, AgentCallError> {
        let response = self
            .client
            .post(Self::url(agent, "/runs"))
            .bearer_auth(&agent.credential)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check_status(response).await?;

        response.json().await.map_err(|e| {
            AgentCallError::new(
                CallErrorClass::MalformedResponse,
                format!("invalid run response: {}", e),
            )
        })
    }

    async fn cancel(&self, agent: &AgentRecord, run_id: RunId) -> Result<(), AgentCallError> {
        let response = self
            .client
            .post(Self::url(agent, &format!("/runs/{}/cancel", run_id)))
            .bearer_auth(&agent.credential)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::RegistrationRequest;
    use serde_json::json;

    fn record(endpoint: &str) -> AgentRecord {
        let reg = RegistrationRequest::from_json(json!({
            "agent_name": "echo",
            "agent_type": "custom",
            "capabilities": ["text"],
            "acp_base_url": endpoint,
            "auth_token": "t",
        }))
        .unwrap()
        .validate()
        .unwrap();
        AgentRecord::pending(reg)
    }

    #[tokio::test]
    async fn closed_port_is_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpAgentClient::new().unwrap();
        let err = client
            .verify(&record(&format!("http://127.0.0.1:{}", port)))
            .await
            .unwrap_err();
        assert_eq!(err.class, CallErrorClass::ConnectionRefused);
    }

    #[tokio::test]
    async fn unhealthy_ping_is_a_failure() {
        use axum::{http::StatusCode, routing::get, Router};

        let app = Router::new()
            .route("/healthy/ping", get(|| async { StatusCode::OK }))
            .route("/degraded/ping", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = HttpAgentClient::new().unwrap();
        client.ping(&record(&format!("{}/healthy", base))).await.unwrap();
        assert!(client.ping(&record(&format!("{}/degraded", base))).await.is_err());
    }
}
