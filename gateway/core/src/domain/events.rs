// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::run::{RunId, RunState};

/// Agent registry lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Registered {
        agent_name: String,
        endpoint: String,
        registered_at: DateTime<Utc>,
    },
    Verified {
        agent_name: String,
        verified_at: DateTime<Utc>,
    },
    VerificationFailed {
        agent_name: String,
        endpoint: String,
        error_class: String,
        failed_at: DateTime<Utc>,
    },
    MarkedInactive {
        agent_name: String,
        consecutive_failures: u32,
        marked_at: DateTime<Utc>,
    },
    Removed {
        agent_name: String,
        removed_at: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn agent_name(&self) -> &str {
        match self {
            Self::Registered { agent_name, .. }
            | Self::Verified { agent_name, .. }
            | Self::VerificationFailed { agent_name, .. }
            | Self::MarkedInactive { agent_name, .. }
            | Self::Removed { agent_name, .. } => agent_name,
        }
    }
}

/// Run lifecycle events. One is published per state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    StateChanged {
        run_id: RunId,
        agent_name: String,
        from: Option<RunState>,
        to: RunState,
        at: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::StateChanged { run_id, .. } => *run_id,
        }
    }

    pub fn state(&self) -> RunState {
        match self {
            Self::StateChanged { to, .. } => *to,
        }
    }
}
