// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Registry Store Interfaces
//!
//! Persistence contracts for the three record types held by the Registry
//! Store, one repository per record type. Interfaces live in the domain layer
//! and are implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Key | Implementations |
//! |-------|--------|-----|----------------|
//! | `AgentRepository` | `AgentRecord` | agent name | `InMemoryAgentRepository` |
//! | `RunRepository` | `RunRecord` | run id | `InMemoryRunRepository` |
//! | `SessionRepository` | `SessionRecord` | session id | `InMemorySessionRepository` |
//!
//! The store offers single-key writes only. There are no multi-record
//! transactions; callers that need read-modify-write atomicity serialise on
//! the record key with [`crate::application::key_lock::KeyedLocks`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::agent::AgentRecord;
use crate::domain::run::{RunId, RunRecord};
use crate::domain::session::{SessionId, SessionRecord};

/// Storage backend selection for the registry store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    InMemory,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Save agent record (create or replace, keyed by name)
    async fn save(&self, agent: &AgentRecord) -> Result<(), RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<AgentRecord>, RepositoryError>;

    /// Snapshot of every record, ordered by registration time
    async fn list_all(&self) -> Result<Vec<AgentRecord>, RepositoryError>;

    /// Returns whether a record was removed
    async fn delete(&self, name: &str) -> Result<bool, RepositoryError>;

    /// Remove every record, returning the removed names
    async fn delete_all(&self) -> Result<Vec<String>, RepositoryError>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn save(&self, run: &RunRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError>;

    /// Newest first, optionally restricted to one agent
    async fn find_recent(
        &self,
        agent_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: &SessionRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: SessionId) -> Result<Option<SessionRecord>, RepositoryError>;

    async fn delete(&self, id: SessionId) -> Result<bool, RepositoryError>;

    /// Sessions whose last activity is strictly before `cutoff`
    async fn find_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
