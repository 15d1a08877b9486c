// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Protocol Wire Types
//!
//! Shapes exchanged between the gateway and a worker's protocol server, and
//! between external callers and the gateway's routing endpoints. The gateway
//! and the worker SDK both depend on these so the two sides cannot drift.
//!
//! ```text
//! caller ──POST /runs {agent, input}──▶ gateway ──POST {endpoint}/runs AgentRunRequest──▶ worker
//!        ◀──────── RunRecord ─────────         ◀──────── AgentRunResponse ─────────────
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::agent::AgentStatus;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePart {
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_role")]
    pub role: String,
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: default_role(),
            parts: vec![MessagePart {
                content: content.into(),
                content_type: default_content_type(),
            }],
        }
    }

    pub fn agent_text(content: impl Into<String>) -> Self {
        Self {
            role: "agent".to_string(),
            ..Self::text(content)
        }
    }

    /// Concatenated text of every part.
    pub fn content(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One element of a caller-supplied run input.
///
/// Callers may send plain strings, `{"content": ...}` objects or full
/// messages; anything else is stringified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputItem {
    Message(Message),
    Content { content: String },
    Text(String),
    Other(Value),
}

impl From<InputItem> for Message {
    fn from(item: InputItem) -> Self {
        match item {
            InputItem::Message(m) => m,
            InputItem::Content { content } => Message::text(content),
            InputItem::Text(s) => Message::text(s),
            InputItem::Other(v) => Message::text(v.to_string()),
        }
    }
}

pub fn normalize_input(items: Vec<InputItem>) -> Vec<Message> {
    items.into_iter().map(Message::from).collect()
}

/// Body of `POST /runs` on the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunBody {
    pub agent: String,
    pub input: Vec<InputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Create a fresh session when no `session_id` is given
    #[serde(default)]
    pub stateful: bool,
}

/// Request the gateway sends to a worker's `POST /runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunRequest {
    pub run_id: String,
    pub agent_name: String,
    pub input: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<Value>,
}

/// Worker reply to `POST /runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResponse {
    pub run_id: String,
    pub status: String,
    #[serde(default)]
    pub output: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<Value>,
}

impl AgentRunResponse {
    pub const COMPLETED: &'static str = "completed";

    pub fn is_completed(&self) -> bool {
        self.status == Self::COMPLETED
    }
}

/// Public description of an agent. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
}

pub fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentList {
    pub agents: Vec<AgentManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_accepts_strings_content_objects_and_messages() {
        let items: Vec<InputItem> = serde_json::from_value(json!([
            "plain",
            {"content": "object"},
            {"role": "user", "parts": [{"content": "full"}]},
            42
        ]))
        .unwrap();

        let messages = normalize_input(items);
        let texts: Vec<String> = messages.iter().map(Message::content).collect();
        assert_eq!(texts, vec!["plain", "object", "full", "42"]);
        assert_eq!(messages[2].parts[0].content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn run_response_defaults_output() {
        let resp: AgentRunResponse =
            serde_json::from_value(json!({"run_id": "r1", "status": "completed"})).unwrap();
        assert!(resp.is_completed());
        assert!(resp.output.is_empty());
        assert!(resp.session_context.is_none());
    }

    #[test]
    fn manifest_fills_defaults() {
        let manifest: AgentManifest = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.status.is_none());
    }
}
