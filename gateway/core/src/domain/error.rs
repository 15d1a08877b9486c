// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Mesh Error Taxonomy
//!
//! Every failure surfaced by a registration, routing or worker-startup
//! operation is a [`MeshError`]: a closed [`ErrorKind`] tag, a human-readable
//! message and a structured `details` object (which field, which agent, which
//! endpoint, the underlying transport error).
//!
//! | Family | Kinds | Codes |
//! |--------|-------|-------|
//! | Registration | `NameConflict` … `VerificationFailed` | `REG_001`–`REG_008` |
//! | Routing | `AgentNotFound` … `InvalidState` | `RUN_001`–`RUN_008` |
//! | Worker | `NoFreePort`, `ServerStartTimeout`, `WorkerHandlerFailed` | `WRK_001`–`WRK_003` |
//! | Store | `StoreError` | `STO_001` |
//!
//! Errors cross the wire as `{code, kind, message, details}` so the worker SDK
//! can rebuild the exact kind the gateway raised.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NameConflict,
    CapabilityError,
    ManifestError,
    MissingRequiredFields,
    PlatformConnectionError,
    PlatformAuthenticationError,
    PlatformUnavailable,
    VerificationFailed,
    AgentNotFound,
    AgentUnavailable,
    SessionNotFound,
    SessionAgentMismatch,
    RoutingTimeout,
    AgentInvocationFailed,
    RunNotFound,
    InvalidState,
    NoFreePort,
    ServerStartTimeout,
    WorkerHandlerFailed,
    StoreError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 20] = [
        Self::NameConflict,
        Self::CapabilityError,
        Self::ManifestError,
        Self::MissingRequiredFields,
        Self::PlatformConnectionError,
        Self::PlatformAuthenticationError,
        Self::PlatformUnavailable,
        Self::VerificationFailed,
        Self::AgentNotFound,
        Self::AgentUnavailable,
        Self::SessionNotFound,
        Self::SessionAgentMismatch,
        Self::RoutingTimeout,
        Self::AgentInvocationFailed,
        Self::RunNotFound,
        Self::InvalidState,
        Self::NoFreePort,
        Self::ServerStartTimeout,
        Self::WorkerHandlerFailed,
        Self::StoreError,
    ];

    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NameConflict => "REG_001",
            Self::CapabilityError => "REG_002",
            Self::ManifestError => "REG_003",
            Self::MissingRequiredFields => "REG_004",
            Self::PlatformConnectionError => "REG_005",
            Self::PlatformAuthenticationError => "REG_006",
            Self::PlatformUnavailable => "REG_007",
            Self::VerificationFailed => "REG_008",
            Self::AgentNotFound => "RUN_001",
            Self::AgentUnavailable => "RUN_002",
            Self::SessionNotFound => "RUN_003",
            Self::SessionAgentMismatch => "RUN_004",
            Self::RoutingTimeout => "RUN_005",
            Self::AgentInvocationFailed => "RUN_006",
            Self::RunNotFound => "RUN_007",
            Self::InvalidState => "RUN_008",
            Self::NoFreePort => "WRK_001",
            Self::ServerStartTimeout => "WRK_002",
            Self::WorkerHandlerFailed => "WRK_003",
            Self::StoreError => "STO_001",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// True for failures detected before any network call.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredFields | Self::ManifestError | Self::CapabilityError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// Structured failure value returned by every core operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{}] {message}", .kind.code())]
pub struct MeshError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Value,
}

impl MeshError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn missing_fields(missing: Vec<String>, required: &[&str], provided: Vec<String>) -> Self {
        Self::new(
            ErrorKind::MissingRequiredFields,
            format!("Missing required fields: {:?}", missing),
        )
        .with_details(json!({
            "missing_fields": missing,
            "required_fields": required,
            "provided_fields": provided,
        }))
    }

    pub fn manifest(invalid_fields: Vec<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ErrorKind::ManifestError,
            format!("Invalid manifest - malformed fields: {:?}: {}", invalid_fields, reason),
        )
        .with_details(json!({ "invalid_fields": invalid_fields, "reason": reason }))
    }

    pub fn capability(invalid: Vec<String>) -> Self {
        Self::new(
            ErrorKind::CapabilityError,
            format!("Invalid capabilities: {:?}", invalid),
        )
        .with_details(json!({ "invalid_capabilities": invalid, "reason": "capabilities must be a non-empty list of non-empty tags" }))
    }

    pub fn name_conflict(agent_name: &str, existing: Value) -> Self {
        Self::new(
            ErrorKind::NameConflict,
            format!("Agent name '{}' is already registered", agent_name),
        )
        .with_details(json!({ "agent_name": agent_name, "existing_agent": existing }))
    }

    pub fn verification_failed(
        agent_name: &str,
        endpoint: &str,
        error_class: &str,
        cause: impl Into<String>,
    ) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::VerificationFailed,
            format!("Agent verification failed for '{}' at {}: {}", agent_name, endpoint, cause),
        )
        .with_details(json!({
            "agent_name": agent_name,
            "endpoint": endpoint,
            "error_class": error_class,
            "cause": cause,
        }))
    }

    pub fn agent_not_found(agent_name: &str) -> Self {
        Self::new(ErrorKind::AgentNotFound, format!("Agent '{}' not found", agent_name))
            .with_details(json!({ "agent_name": agent_name }))
    }

    pub fn agent_unavailable(agent_name: &str, status: &str) -> Self {
        Self::new(
            ErrorKind::AgentUnavailable,
            format!("Agent '{}' is not available for routing (status: {})", agent_name, status),
        )
        .with_details(json!({ "agent_name": agent_name, "status": status }))
    }

    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(ErrorKind::SessionNotFound, format!("Session '{}' not found", session_id))
            .with_details(json!({ "session_id": session_id }))
    }

    pub fn run_not_found(run_id: &str) -> Self {
        Self::new(ErrorKind::RunNotFound, format!("Run '{}' not found", run_id))
            .with_details(json!({ "run_id": run_id }))
    }

    pub fn platform_connection(platform_url: &str, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::PlatformConnectionError,
            format!("Unable to connect to platform at {}", platform_url),
        )
        .with_details(json!({ "platform_url": platform_url, "connection_error": cause }))
    }

    /// Serialized `{code, kind, message, details}` body.
    pub fn to_body(&self) -> Value {
        json!({
            "code": self.code(),
            "kind": self.kind,
            "message": self.message,
            "details": self.details,
        })
    }

    /// Rebuild an error from a `{code, kind, message, details}` body.
    pub fn from_body(body: &Value) -> Option<Self> {
        let kind = body
            .get("code")
            .and_then(Value::as_str)
            .and_then(ErrorKind::from_code)
            .or_else(|| {
                body.get("kind")
                    .and_then(|k| serde_json::from_value::<ErrorKind>(k.clone()).ok())
            })?;
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let details = body.get("details").cloned().unwrap_or(Value::Null);
        Some(Self { kind, message, details })
    }
}

impl Serialize for MeshError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_body().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MeshError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let body = Value::deserialize(deserializer)?;
        Self::from_body(&body).ok_or_else(|| serde::de::Error::custom("unrecognised error body"))
    }
}

impl From<RepositoryError> for MeshError {
    fn from(err: RepositoryError) -> Self {
        MeshError::new(ErrorKind::StoreError, format!("Registry store failure: {}", err))
            .with_details(json!({ "store_error": err.to_string() }))
    }
}

pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_reversible() {
        let mut seen = std::collections::HashSet::new();
        for kind in ErrorKind::ALL {
            assert!(seen.insert(kind.code()), "duplicate code {}", kind.code());
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn body_round_trip_preserves_kind_and_details() {
        let err = MeshError::verification_failed("echo", "http://localhost:9001", "connection_refused", "refused");
        let body = err.to_body();
        assert_eq!(body["code"], "REG_008");
        assert_eq!(body["kind"], "verification_failed");

        let back = MeshError::from_body(&body).unwrap();
        assert_eq!(back, err);
        assert_eq!(back.details["endpoint"], "http://localhost:9001");
    }

    #[test]
    fn missing_fields_lists_every_field() {
        let err = MeshError::missing_fields(
            vec!["agent_type".into(), "auth_token".into()],
            &["agent_name", "agent_type", "auth_token"],
            vec!["agent_name".into()],
        );
        assert_eq!(err.kind, ErrorKind::MissingRequiredFields);
        assert!(err.kind.is_input_error());
        assert_eq!(err.details["missing_fields"].as_array().unwrap().len(), 2);
        assert!(err.to_string().starts_with("[REG_004]"));
    }

    #[test]
    fn display_uses_snake_case_kind() {
        assert_eq!(ErrorKind::RoutingTimeout.to_string(), "routing_timeout");
    }
}
