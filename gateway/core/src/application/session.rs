// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Session Manager
//!
//! Keyed continuity state for stateful agents. Context merges are
//! read-modify-write under the session's lock so overlapping runs on one
//! session cannot lose each other's updates.
//!
//! A session idle for longer than the inactivity window is treated as absent
//! on every read and deleted, even if the sweeper has not reached it yet.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::key_lock::KeyedLocks;
use crate::domain::agent::AgentStatus;
use crate::domain::error::{ErrorKind, MeshError, MeshResult};
use crate::domain::repository::{AgentRepository, SessionRepository};
use crate::domain::session::{SessionId, SessionRecord};

pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    agents: Arc<dyn AgentRepository>,
    locks: KeyedLocks,
    inactivity: Duration,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        agents: Arc<dyn AgentRepository>,
        inactivity: Duration,
    ) -> Self {
        Self {
            sessions,
            agents,
            locks: KeyedLocks::new(),
            inactivity,
        }
    }

    pub fn inactivity(&self) -> Duration {
        self.inactivity
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.inactivity).unwrap_or(chrono::Duration::MAX)
    }

    /// New session bound to an existing, active agent.
    pub async fn create(&self, agent_name: &str) -> MeshResult<SessionRecord> {
        let agent = self
            .agents
            .find_by_name(agent_name)
            .await?
            .ok_or_else(|| MeshError::agent_not_found(agent_name))?;
        if agent.status != AgentStatus::Active {
            return Err(MeshError::agent_unavailable(agent_name, agent.status.as_str()));
        }

        let session = SessionRecord::new(agent_name);
        self.sessions.save(&session).await?;
        debug!(session_id = %session.id, agent_name, "Session created");
        Ok(session)
    }

    /// Load `session_id` for `agent_name`, or create a fresh session when no id
    /// is given. A given id that is unknown or expired is an error; it is
    /// never silently replaced.
    pub async fn get_or_create(
        &self,
        session_id: Option<SessionId>,
        agent_name: &str,
    ) -> MeshResult<SessionRecord> {
        match session_id {
            Some(id) => {
                let session = self.get(id).await?;
                if session.agent_name != agent_name {
                    return Err(MeshError::new(
                        ErrorKind::SessionAgentMismatch,
                        format!(
                            "Session '{}' belongs to agent '{}', not '{}'",
                            id, session.agent_name, agent_name
                        ),
                    )
                    .with_details(serde_json::json!({
                        "session_id": id.to_string(),
                        "session_agent": session.agent_name,
                        "requested_agent": agent_name,
                    })));
                }
                Ok(session)
            }
            None => self.create(agent_name).await,
        }
    }

    pub async fn get(&self, id: SessionId) -> MeshResult<SessionRecord> {
        let session = self
            .sessions
            .find_by_id(id)
            .await?
            .ok_or_else(|| MeshError::session_not_found(&id.to_string()))?;

        if session.is_expired(Utc::now(), self.window()) {
            let _guard = self.locks.lock(&id.to_string()).await;
            // Re-check under the lock; a concurrent touch may have revived it
            if let Some(current) = self.sessions.find_by_id(id).await? {
                if current.is_expired(Utc::now(), self.window()) {
                    self.sessions.delete(id).await?;
                    info!(session_id = %id, "Session expired");
                    return Err(MeshError::session_not_found(&id.to_string()));
                }
                return Ok(current);
            }
            return Err(MeshError::session_not_found(&id.to_string()));
        }
        Ok(session)
    }

    pub async fn touch(&self, id: SessionId) -> MeshResult<SessionRecord> {
        self.update(id, |_| {}).await
    }

    /// Merge `update` into the session context and record activity.
    pub async fn merge_context(&self, id: SessionId, update: Value) -> MeshResult<SessionRecord> {
        self.update(id, move |session| session.merge_context(update)).await
    }

    async fn update<F>(&self, id: SessionId, apply: F) -> MeshResult<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let _guard = self.locks.lock(&id.to_string()).await;
        let mut session = self
            .sessions
            .find_by_id(id)
            .await?
            .ok_or_else(|| MeshError::session_not_found(&id.to_string()))?;
        apply(&mut session);
        session.touch(Utc::now());
        self.sessions.save(&session).await?;
        Ok(session)
    }

    pub async fn delete(&self, id: SessionId) -> MeshResult<()> {
        let guard = self.locks.lock(&id.to_string()).await;
        let removed = self.sessions.delete(id).await?;
        drop(guard);
        self.locks.prune();
        if removed {
            Ok(())
        } else {
            Err(MeshError::session_not_found(&id.to_string()))
        }
    }

    /// Delete every session idle for longer than `max_idle`. Returns how many
    /// were removed.
    pub async fn expire_older_than(&self, max_idle: Duration) -> MeshResult<usize> {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return Ok(0);
        };
        let stale = self.sessions.find_inactive_since(cutoff).await?;

        let mut removed = 0;
        for candidate in stale {
            let _guard = self.locks.lock(&candidate.id.to_string()).await;
            let still_stale = self
                .sessions
                .find_by_id(candidate.id)
                .await?
                .is_some_and(|s| s.last_activity_at < cutoff);
            if still_stale && self.sessions.delete(candidate.id).await? {
                removed += 1;
            }
        }
        self.locks.prune();
        Ok(removed)
    }
}

/// Background task running [`SessionManager::expire_older_than`] on an interval.
pub struct SessionSweeper {
    manager: Arc<SessionManager>,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl SessionSweeper {
    pub fn new(manager: Arc<SessionManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            interval_seconds = self.interval.as_secs(),
            inactivity_seconds = self.manager.inactivity().as_secs(),
            "Starting session sweeper"
        );

        let mut tick = interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.manager.expire_older_than(self.manager.inactivity()).await {
                        Ok(0) => debug!("Session sweep found nothing to expire"),
                        Ok(removed) => info!(removed, "Expired idle sessions"),
                        Err(e) => warn!("Session sweep failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping session sweeper");
                    break;
                }
            }
        }
    }
}
