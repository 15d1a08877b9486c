// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Run Record
//!
//! One routed request/response cycle. State only moves forward:
//!
//! ```text
//! Created ──▶ InProgress ──▶ Completed
//!    │            ├────────▶ Failed
//!    └────────────┴────────▶ Cancelled
//! ```
//!
//! Terminal states are final and `finished_at` is written exactly once, at the
//! terminal transition. Every mutation goes through [`RunRecord::transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::{ErrorKind, MeshError};
use crate::domain::protocol::Message;
use crate::domain::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Created, InProgress)
                | (Created, Failed)
                | (Created, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Run {run_id} cannot move from {from} to {to}")]
pub struct RunTransitionError {
    pub run_id: RunId,
    pub from: RunState,
    pub to: RunState,
}

impl From<RunTransitionError> for MeshError {
    fn from(err: RunTransitionError) -> Self {
        MeshError::new(ErrorKind::InvalidState, err.to_string()).with_details(serde_json::json!({
            "run_id": err.run_id.to_string(),
            "state": err.from,
            "requested": err.to,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    state: RunState,
    pub input: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MeshError>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(agent_name: impl Into<String>, input: Vec<Message>, session_id: Option<SessionId>) -> Self {
        Self {
            id: RunId::new(),
            agent_name: agent_name.into(),
            session_id,
            state: RunState::Created,
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, to: RunState) -> Result<(), RunTransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(RunTransitionError {
                run_id: self.id,
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        if to == RunState::InProgress {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        self.state = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), RunTransitionError> {
        self.transition(RunState::InProgress)
    }

    pub fn complete(&mut self, output: Vec<Message>) -> Result<(), RunTransitionError> {
        self.transition(RunState::Completed)?;
        self.output = Some(output);
        Ok(())
    }

    /// Completed with output, carrying a non-fatal follow-up failure.
    pub fn complete_with_error(&mut self, output: Vec<Message>, error: MeshError) -> Result<(), RunTransitionError> {
        self.complete(output)?;
        self.error = Some(error);
        Ok(())
    }

    pub fn fail(&mut self, error: MeshError) -> Result<(), RunTransitionError> {
        self.transition(RunState::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), RunTransitionError> {
        self.transition(RunState::Cancelled)
    }

    /// Text of the first output message, if any.
    pub fn output_text(&self) -> Option<String> {
        self.output.as_ref()?.first().map(Message::content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunRecord {
        RunRecord::new("echo", vec![Message::text("hi")], None)
    }

    #[test]
    fn happy_path_sets_timestamps_once() {
        let mut r = run();
        assert_eq!(r.state(), RunState::Created);
        assert!(r.started_at.is_none());

        r.start().unwrap();
        assert_eq!(r.state(), RunState::InProgress);
        assert!(r.started_at.is_some());
        assert!(r.finished_at.is_none());

        r.complete(vec![Message::agent_text("Processed: hi")]).unwrap();
        assert_eq!(r.state(), RunState::Completed);
        assert_eq!(r.output_text().as_deref(), Some("Processed: hi"));
        let finished = r.finished_at.unwrap();

        assert!(r.cancel().is_err());
        assert_eq!(r.finished_at, Some(finished));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [RunState::Completed, RunState::Failed, RunState::Cancelled] {
            for next in [
                RunState::Created,
                RunState::InProgress,
                RunState::Completed,
                RunState::Failed,
                RunState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn no_backwards_transitions() {
        assert!(!RunState::InProgress.can_transition_to(RunState::Created));
        assert!(!RunState::Created.can_transition_to(RunState::Completed));
    }

    #[test]
    fn failure_records_error() {
        let mut r = run();
        r.start().unwrap();
        r.fail(MeshError::new(ErrorKind::RoutingTimeout, "timed out")).unwrap();
        assert_eq!(r.state(), RunState::Failed);
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::RoutingTimeout);
        assert!(r.output.is_none());
    }

    #[test]
    fn completion_can_carry_a_follow_up_error() {
        let mut r = run();
        r.start().unwrap();
        r.complete_with_error(
            vec![Message::agent_text("done")],
            MeshError::session_not_found("s1"),
        )
        .unwrap();
        assert_eq!(r.state(), RunState::Completed);
        assert_eq!(r.output_text().as_deref(), Some("done"));
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::SessionNotFound);
    }

    #[test]
    fn invalid_transition_maps_to_invalid_state() {
        let mut r = run();
        r.cancel().unwrap();
        let err: MeshError = r.start().unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert_eq!(err.details["state"], "cancelled");
    }

    #[test]
    fn serializes_state_in_snake_case() {
        let mut r = run();
        r.start().unwrap();
        let body = serde_json::to_value(&r).unwrap();
        assert_eq!(body["state"], "in_progress");
    }
}
