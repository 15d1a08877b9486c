// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Client for the gateway's registration endpoints.
//!
//! Every call is attempted exactly once. Gateway error bodies are decoded
//! back into the [`MeshError`] the gateway raised; anything else is mapped
//! from the HTTP status.

use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use mesh_gateway_core::agent::RegistrationRequest;
use mesh_gateway_core::error::{ErrorKind, MeshError, MeshResult};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PlatformClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /platform/agents/register`; returns the gateway's response body.
    pub async fn register(&self, request: &RegistrationRequest) -> MeshResult<Value> {
        let url = format!("{}/platform/agents/register", self.base_url);
        debug!(url = %url, agent_name = %request.agent_name, "Registering with platform");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| MeshError::platform_connection(&self.base_url, e.to_string()))?;

        if response.status().is_success() {
            let body = response
                .json()
                .await
                .map_err(|e| MeshError::platform_connection(&self.base_url, format!("invalid response body: {}", e)))?;
            info!(agent_name = %request.agent_name, platform_url = %self.base_url, "Registered with platform");
            return Ok(body);
        }
        Err(self.error_from_response(response).await)
    }

    /// `DELETE /platform/agents/{name}`. `Ok(false)` when the gateway no
    /// longer knows the agent.
    pub async fn deregister(&self, agent_name: &str) -> MeshResult<bool> {
        let url = format!("{}/platform/agents/{}", self.base_url, agent_name);
        let response = self
            .client
            .delete(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MeshError::platform_connection(&self.base_url, e.to_string()))?;

        match response.status() {
            s if s.is_success() => {
                info!(agent_name, "Deregistered from platform");
                Ok(true)
            }
            StatusCode::NOT_FOUND => {
                debug!(agent_name, "Agent already removed from platform");
                Ok(false)
            }
            _ => Err(self.error_from_response(response).await),
        }
    }

    async fn error_from_response(&self, response: Response) -> MeshError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.unwrap_or_default();

        if let Some(error) = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| MeshError::from_body(&body))
        {
            return error;
        }

        match status {
            StatusCode::CONFLICT => MeshError::new(ErrorKind::NameConflict, text),
            StatusCode::BAD_REQUEST => MeshError::manifest(vec!["invalid_data".into()], text),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MeshError::new(
                ErrorKind::PlatformAuthenticationError,
                format!("Platform rejected the request ({})", status),
            )
            .with_details(json!({ "auth_method": "bearer_token", "response": text })),
            StatusCode::SERVICE_UNAVAILABLE => MeshError::new(
                ErrorKind::PlatformUnavailable,
                format!("Platform at {} is unavailable", self.base_url),
            )
            .with_details(json!({ "platform_url": self.base_url, "retry_after": retry_after })),
            _ => MeshError::platform_connection(&self.base_url, format!("HTTP {}: {}", status, text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            agent_name: "echo".into(),
            agent_type: "custom".into(),
            capabilities: vec!["text".into()],
            acp_base_url: "http://localhost:9001".into(),
            auth_token: "t".into(),
            version: None,
            description: None,
            tags: vec![],
            contact: None,
        }
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn unreachable_platform_fails_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = PlatformClient::new(url).register(&request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PlatformConnectionError);
    }

    #[tokio::test]
    async fn gateway_error_bodies_round_trip() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/platform/agents/register",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    let error = MeshError::name_conflict("echo", json!({ "name": "echo" }));
                    (AxumStatus::CONFLICT, Json(error.to_body()))
                }
            }),
        );
        let url = spawn(router).await;

        let err = PlatformClient::new(url).register(&request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameConflict);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bare_statuses_are_mapped() {
        let router = Router::new().route(
            "/platform/agents/register",
            post(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "down for maintenance") }),
        );
        let url = spawn(router).await;

        let err = PlatformClient::new(url).register(&request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PlatformUnavailable);
    }
}
