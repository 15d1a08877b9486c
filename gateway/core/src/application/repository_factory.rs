// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory
//!
//! Creates concrete registry store implementations for the configured backend,
//! keeping the domain layer free of infrastructure types.

use std::sync::Arc;

use crate::domain::repository::{AgentRepository, RunRepository, SessionRepository, StorageBackend};
use crate::infrastructure::repositories::{
    InMemoryAgentRepository, InMemoryRunRepository, InMemorySessionRepository,
};

/// The three repositories that make up one registry store.
#[derive(Clone)]
pub struct RegistryStore {
    pub agents: Arc<dyn AgentRepository>,
    pub runs: Arc<dyn RunRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl RegistryStore {
    pub fn new(backend: &StorageBackend) -> Self {
        Self {
            agents: create_agent_repository(backend),
            runs: create_run_repository(backend),
            sessions: create_session_repository(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(&StorageBackend::InMemory)
    }
}

pub fn create_agent_repository(backend: &StorageBackend) -> Arc<dyn AgentRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAgentRepository::new()),
    }
}

pub fn create_run_repository(backend: &StorageBackend) -> Arc<dyn RunRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryRunRepository::new()),
    }
}

pub fn create_session_repository(backend: &StorageBackend) -> Arc<dyn SessionRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemorySessionRepository::new()),
    }
}
