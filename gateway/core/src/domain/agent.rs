// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Record
//!
//! Identity and routing facts for one worker. A record is created `Pending`
//! by the registry, becomes `Active` only through a successful verification,
//! and may later be marked `Inactive` by the health monitor.
//!
//! ```text
//! Pending ──verify ok──▶ Active ──health failures──▶ Inactive
//!    │                      ▲                           │
//!    └──verify failed──▶ (deleted)      └──verify ok────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::{MeshError, MeshResult};
use crate::domain::protocol::{default_version, AgentManifest};

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 50;

/// Validated agent name: 3-50 chars, ASCII alphanumeric or underscore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    pub fn parse(raw: &str) -> MeshResult<Self> {
        let len = raw.chars().count();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
            return Err(MeshError::manifest(
                vec!["agent_name".into()],
                format!(
                    "agent name must be {}-{} characters, got {}",
                    NAME_MIN_LEN, NAME_MAX_LEN, len
                ),
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MeshError::manifest(
                vec!["agent_name".into()],
                "agent name must contain only letters, digits and underscores",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentName {
    type Error = MeshError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Active,
    Inactive,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            other => Err(MeshError::manifest(
                vec!["status".into()],
                format!("unknown agent status '{}'", other),
            )),
        }
    }
}

/// Payload of `POST /platform/agents/register`.
///
/// Unknown keys (`metadata`, `port`, `url`, content types) are accepted and
/// ignored so richer workers can register against this gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub agent_name: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub acp_base_url: String,
    pub auth_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl RegistrationRequest {
    pub const REQUIRED_FIELDS: [&'static str; 5] = [
        "agent_name",
        "agent_type",
        "capabilities",
        "acp_base_url",
        "auth_token",
    ];

    /// Decode a raw JSON payload, distinguishing absent fields
    /// (`MissingRequiredFields`) from ill-typed ones (`ManifestError`).
    pub fn from_json(payload: Value) -> MeshResult<Self> {
        let Some(object) = payload.as_object() else {
            return Err(MeshError::manifest(vec![], "registration payload must be a JSON object"));
        };

        let missing: Vec<String> = Self::REQUIRED_FIELDS
            .iter()
            .filter(|f| object.get(**f).map_or(true, Value::is_null))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            let provided = object.keys().cloned().collect();
            return Err(MeshError::missing_fields(missing, &Self::REQUIRED_FIELDS, provided));
        }

        let invalid: Vec<String> = [
            ("agent_name", object["agent_name"].is_string()),
            ("agent_type", object["agent_type"].is_string()),
            ("capabilities", object["capabilities"].is_array()),
            ("acp_base_url", object["acp_base_url"].is_string()),
            ("auth_token", object["auth_token"].is_string()),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(f, _)| f.to_string())
        .collect();
        if !invalid.is_empty() {
            return Err(MeshError::manifest(invalid, "required fields have the wrong type"));
        }

        serde_json::from_value(payload)
            .map_err(|e| MeshError::manifest(vec![], format!("malformed registration payload: {}", e)))
    }

    /// Structural validation; no network access.
    pub fn validate(self) -> MeshResult<AgentRegistration> {
        let name = AgentName::parse(&self.agent_name)?;

        let kind = self.agent_type.trim().to_string();
        if kind.is_empty() {
            return Err(MeshError::manifest(vec!["agent_type".into()], "agent type must not be empty"));
        }

        let capabilities = normalize_capabilities(self.capabilities)?;
        let endpoint = normalize_endpoint(&self.acp_base_url)?;

        if self.auth_token.trim().is_empty() {
            return Err(MeshError::manifest(vec!["auth_token".into()], "auth token must not be empty"));
        }

        Ok(AgentRegistration {
            name,
            kind,
            capabilities,
            endpoint,
            credential: self.auth_token,
            version: self.version.filter(|v| !v.is_empty()).unwrap_or_else(default_version),
            description: self.description.unwrap_or_default(),
            tags: self.tags,
            contact: self.contact.unwrap_or_default(),
        })
    }
}

/// Deduplicates while keeping first-seen order.
fn normalize_capabilities(raw: Vec<String>) -> MeshResult<Vec<String>> {
    let invalid: Vec<String> = raw.iter().filter(|c| c.trim().is_empty()).cloned().collect();
    if raw.is_empty() || !invalid.is_empty() {
        return Err(MeshError::capability(invalid));
    }
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for cap in raw {
        let cap = cap.trim().to_string();
        if !out.contains(&cap) {
            out.push(cap);
        }
    }
    Ok(out)
}

fn normalize_endpoint(raw: &str) -> MeshResult<String> {
    let parsed = url::Url::parse(raw).map_err(|e| {
        MeshError::manifest(vec!["acp_base_url".into()], format!("invalid endpoint URL '{}': {}", raw, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(MeshError::manifest(
            vec!["acp_base_url".into()],
            format!("endpoint '{}' must be an http(s) URL with a host", raw),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// A registration that passed structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRegistration {
    pub name: AgentName,
    pub kind: String,
    pub capabilities: Vec<String>,
    pub endpoint: String,
    pub credential: String,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: AgentName,
    pub kind: String,
    pub capabilities: Vec<String>,
    pub endpoint: String,
    pub credential: String,
    pub status: AgentStatus,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub contact: String,
    pub registered_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn pending(registration: AgentRegistration) -> Self {
        Self {
            name: registration.name,
            kind: registration.kind,
            capabilities: registration.capabilities,
            endpoint: registration.endpoint,
            credential: registration.credential,
            status: AgentStatus::Pending,
            version: registration.version,
            description: registration.description,
            tags: registration.tags,
            contact: registration.contact,
            registered_at: Utc::now(),
            last_verified_at: None,
        }
    }

    /// Only a successful verification may call this.
    pub fn mark_verified(&mut self, at: DateTime<Utc>) {
        self.status = AgentStatus::Active;
        self.last_verified_at = Some(at);
    }

    pub fn mark_inactive(&mut self) {
        self.status = AgentStatus::Inactive;
    }

    pub fn manifest(&self) -> AgentManifest {
        AgentManifest {
            name: self.name.to_string(),
            version: self.version.clone(),
            description: self.description.clone(),
            capabilities: self.capabilities.clone(),
            tags: self.tags.clone(),
            contact: self.contact.clone(),
            kind: Some(self.kind.clone()),
            status: Some(self.status),
        }
    }
}

/// Filter for `list`; every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentFilter {
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub capability: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

impl AgentFilter {
    pub fn matches(&self, record: &AgentRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self
                .capability
                .as_ref()
                .map_or(true, |c| record.capabilities.iter().any(|rc| rc == c))
            && self.kind.as_ref().map_or(true, |k| &record.kind == k)
    }
}
