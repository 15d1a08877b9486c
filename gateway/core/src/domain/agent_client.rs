// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

// Outbound calls from the gateway to a worker's protocol server.
//
// The traits carry no timeout of their own; callers bound every call with
// `tokio::time::timeout` so a fake and the HTTP client time out identically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::AgentRecord;
use crate::domain::protocol::{AgentRunRequest, AgentRunResponse};
use crate::domain::run::RunId;

/// Transport-level failure class, surfaced in error details as `error_class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorClass {
    Timeout,
    ConnectionRefused,
    AuthRejected,
    MalformedResponse,
    HttpStatus,
    Transport,
}

impl CallErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::AuthRejected => "auth_rejected",
            Self::MalformedResponse => "malformed_response",
            Self::HttpStatus => "http_status",
            Self::Transport => "transport",
        }
    }
}

impl std::fmt::Display for CallErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class}: {message}")]
pub struct AgentCallError {
    pub class: CallErrorClass,
    pub message: String,
}

impl AgentCallError {
    pub fn new(class: CallErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Liveness probes against a registered agent.
#[async_trait]
pub trait AgentVerifier: Send + Sync {
    /// Full check: the agent answers its manifest listing with its credential.
    async fn verify(&self, agent: &AgentRecord) -> Result<(), AgentCallError>;

    /// Lightweight periodic check.
    async fn ping(&self, agent: &AgentRecord) -> Result<(), AgentCallError>;
}

/// Run delivery to a registered agent.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: &AgentRecord,
        request: &AgentRunRequest,
    ) -> Result<AgentRunResponse, AgentCallError>;

    /// Best-effort notice that the gateway stopped waiting for `run_id`.
    async fn cancel(&self, agent: &AgentRecord, run_id: RunId) -> Result<(), AgentCallError>;
}
