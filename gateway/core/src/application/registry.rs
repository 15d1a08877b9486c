// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Agent Registry
//!
//! Owns agent record CRUD and name uniqueness. Registration is all-or-nothing:
//! the record is stored `Pending`, verified synchronously, and either promoted
//! to `Active` or deleted before `register` returns.
//!
//! Every mutation of one name runs under that name's [`KeyedLocks`] entry, so a
//! verification and a concurrent deregistration of the same agent are
//! mutually exclusive while different agents proceed in parallel.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::health::HealthMonitor;
use crate::application::key_lock::KeyedLocks;
use crate::application::verification::VerificationWorkflow;
use crate::domain::agent::{AgentFilter, AgentRecord, AgentStatus, RegistrationRequest};
use crate::domain::error::{ErrorKind, MeshError, MeshResult};
use crate::domain::events::AgentEvent;
use crate::domain::repository::AgentRepository;
use crate::infrastructure::event_bus::EventBus;

#[async_trait]
pub trait AgentRegistryService: Send + Sync {
    /// Validate, store as pending, verify, then activate or roll back.
    async fn register(&self, request: RegistrationRequest) -> MeshResult<AgentRecord>;

    /// Same as [`register`](Self::register) for an undecoded JSON payload.
    async fn register_json(&self, payload: Value) -> MeshResult<AgentRecord> {
        let request = RegistrationRequest::from_json(payload)?;
        self.register(request).await
    }

    async fn lookup(&self, name: &str) -> MeshResult<AgentRecord>;

    /// Snapshot ordered by registration time.
    async fn list(&self, filter: &AgentFilter) -> MeshResult<Vec<AgentRecord>>;

    /// In-flight runs against the agent are left to finish or fail.
    async fn deregister(&self, name: &str) -> MeshResult<()>;

    /// Remove every agent, returning the removed names.
    async fn cleanup_all(&self) -> MeshResult<Vec<String>>;
}

pub struct StandardAgentRegistry {
    agents: Arc<dyn AgentRepository>,
    verification: Arc<VerificationWorkflow>,
    locks: Arc<KeyedLocks>,
    health: Option<Arc<HealthMonitor>>,
    event_bus: EventBus,
}

impl StandardAgentRegistry {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        verification: Arc<VerificationWorkflow>,
        locks: Arc<KeyedLocks>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            agents,
            verification,
            locks,
            health: None,
            event_bus,
        }
    }

    /// Start periodic liveness checks for every agent that passes verification.
    pub fn with_health_monitor(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    fn stop_monitor(&self, name: &str) {
        if let Some(health) = &self.health {
            health.unwatch(name);
        }
    }
}

#[async_trait]
impl AgentRegistryService for StandardAgentRegistry {
    async fn register(&self, request: RegistrationRequest) -> MeshResult<AgentRecord> {
        let registration = request.validate()?;
        let name = registration.name.to_string();

        let _guard = self.locks.lock(&name).await;

        if let Some(existing) = self.agents.find_by_name(&name).await? {
            if existing.status == AgentStatus::Active {
                warn!(agent_name = %name, "Registration rejected, name already active");
                let existing_manifest = serde_json::to_value(existing.manifest()).unwrap_or(Value::Null);
                return Err(MeshError::name_conflict(&name, existing_manifest));
            }
            info!(agent_name = %name, status = existing.status.as_str(), "Replacing non-active agent record");
            self.stop_monitor(&name);
        }

        let mut record = AgentRecord::pending(registration);
        self.agents.save(&record).await?;
        self.event_bus.publish_agent_event(AgentEvent::Registered {
            agent_name: name.clone(),
            endpoint: record.endpoint.clone(),
            registered_at: record.registered_at,
        });

        match self.verification.verify(&mut record).await {
            Ok(()) => {
                self.agents.save(&record).await?;
                self.event_bus.publish_agent_event(AgentEvent::Verified {
                    agent_name: name.clone(),
                    verified_at: record.last_verified_at.unwrap_or_else(Utc::now),
                });
                if let Some(health) = &self.health {
                    health.watch(&name);
                }
                info!(agent_name = %name, endpoint = %record.endpoint, "Agent registered");
                Ok(record)
            }
            Err(err) => {
                self.agents.delete(&name).await?;
                self.event_bus.publish_agent_event(AgentEvent::VerificationFailed {
                    agent_name: name.clone(),
                    endpoint: record.endpoint.clone(),
                    error_class: err.details["error_class"].as_str().unwrap_or("unknown").to_string(),
                    failed_at: Utc::now(),
                });
                Err(err)
            }
        }
    }

    async fn lookup(&self, name: &str) -> MeshResult<AgentRecord> {
        self.agents
            .find_by_name(name)
            .await?
            .ok_or_else(|| MeshError::agent_not_found(name))
    }

    async fn list(&self, filter: &AgentFilter) -> MeshResult<Vec<AgentRecord>> {
        let agents = self.agents.list_all().await?;
        Ok(agents.into_iter().filter(|a| filter.matches(a)).collect())
    }

    async fn deregister(&self, name: &str) -> MeshResult<()> {
        let guard = self.locks.lock(name).await;
        let removed = self.agents.delete(name).await?;
        self.stop_monitor(name);
        drop(guard);
        self.locks.prune();

        if !removed {
            return Err(MeshError::agent_not_found(name));
        }
        self.event_bus.publish_agent_event(AgentEvent::Removed {
            agent_name: name.to_string(),
            removed_at: Utc::now(),
        });
        info!(agent_name = %name, "Agent deregistered");
        Ok(())
    }

    async fn cleanup_all(&self) -> MeshResult<Vec<String>> {
        let mut removed = Vec::new();
        for record in self.agents.list_all().await? {
            let name = record.name.to_string();
            match self.deregister(&name).await {
                Ok(()) => removed.push(name),
                // Raced with another deregistration
                Err(e) if e.kind == ErrorKind::AgentNotFound => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(health) = &self.health {
            health.unwatch_all();
        }
        info!(count = removed.len(), "Removed all agents");
        Ok(removed)
    }
}
