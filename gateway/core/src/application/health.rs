// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Agent Health Monitor - periodic liveness for verified agents
//!
//! One background loop per active agent. Active agents are pinged; an agent
//! already marked inactive gets a full verification instead, so it can only
//! return to `Active` through the Verification Workflow.
//!
//! Probes run without holding the agent's lock. Each result is applied under
//! the per-name lock against a fresh read, and discarded if the record was
//! removed or replaced by a newer registration in the meantime.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::key_lock::KeyedLocks;
use crate::application::verification::VerificationWorkflow;
use crate::domain::agent::{AgentRecord, AgentStatus};
use crate::domain::config::HealthConfig;
use crate::domain::error::MeshResult;
use crate::domain::events::AgentEvent;
use crate::domain::repository::AgentRepository;
use crate::infrastructure::event_bus::EventBus;

struct Watcher {
    id: Uuid,
    token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Continue,
    RecordGone,
}

pub struct HealthMonitor {
    agents: Arc<dyn AgentRepository>,
    verification: Arc<VerificationWorkflow>,
    locks: Arc<KeyedLocks>,
    event_bus: EventBus,
    interval: Duration,
    max_failures: u32,
    shutdown_token: CancellationToken,
    watchers: DashMap<String, Watcher>,
}

impl HealthMonitor {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        verification: Arc<VerificationWorkflow>,
        locks: Arc<KeyedLocks>,
        event_bus: EventBus,
        config: &HealthConfig,
    ) -> Self {
        Self {
            agents,
            verification,
            locks,
            event_bus,
            interval: config.interval(),
            max_failures: config.max_failures.max(1),
            shutdown_token: CancellationToken::new(),
            watchers: DashMap::new(),
        }
    }

    /// Cancelling this token stops every loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start (or restart) the loop for `agent_name`.
    pub fn watch(self: &Arc<Self>, agent_name: &str) {
        let id = Uuid::new_v4();
        let token = self.shutdown_token.child_token();
        if let Some(previous) = self.watchers.insert(
            agent_name.to_string(),
            Watcher {
                id,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let monitor = Arc::clone(self);
        let name = agent_name.to_string();
        tokio::spawn(async move {
            monitor.run(name, id, token).await;
        });
    }

    pub fn unwatch(&self, agent_name: &str) {
        if let Some((_, watcher)) = self.watchers.remove(agent_name) {
            watcher.token.cancel();
            debug!(agent_name, "Health monitor stopped");
        }
    }

    pub fn unwatch_all(&self) {
        let names: Vec<String> = self.watchers.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.unwatch(&name);
        }
    }

    pub fn is_watching(&self, agent_name: &str) -> bool {
        self.watchers.contains_key(agent_name)
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.watchers.clear();
    }

    async fn run(&self, agent_name: String, id: Uuid, token: CancellationToken) {
        debug!(agent_name = %agent_name, interval_ms = self.interval.as_millis() as u64, "Health monitor started");

        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    match self.check_once(&agent_name, &mut failures).await {
                        Ok(CheckOutcome::Continue) => {}
                        Ok(CheckOutcome::RecordGone) => {
                            debug!(agent_name = %agent_name, "Agent record gone, stopping health monitor");
                            break;
                        }
                        Err(e) => warn!(agent_name = %agent_name, "Health check failed: {}", e),
                    }
                }
            }
        }

        self.watchers.remove_if(&agent_name, |_, w| w.id == id);
    }

    async fn check_once(&self, agent_name: &str, failures: &mut u32) -> MeshResult<CheckOutcome> {
        let Some(snapshot) = self.agents.find_by_name(agent_name).await? else {
            return Ok(CheckOutcome::RecordGone);
        };

        let full_verification = snapshot.status != AgentStatus::Active;
        let probe_ok = if full_verification {
            let mut candidate = snapshot.clone();
            self.verification.verify(&mut candidate).await.is_ok()
        } else {
            match self.verification.ping(&snapshot).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(agent_name, error_class = %e.class, "Ping failed: {}", e.message);
                    false
                }
            }
        };

        let _guard = self.locks.lock(agent_name).await;
        let Some(mut record) = self.agents.find_by_name(agent_name).await? else {
            return Ok(CheckOutcome::RecordGone);
        };
        if !same_registration(&record, &snapshot) {
            return Ok(CheckOutcome::Continue);
        }

        if probe_ok {
            *failures = 0;
            let now = Utc::now();
            if record.status == AgentStatus::Active {
                record.last_verified_at = Some(now);
                self.agents.save(&record).await?;
            } else if full_verification {
                record.mark_verified(now);
                self.agents.save(&record).await?;
                info!(agent_name, "Agent passed verification again, restored to active");
                self.event_bus.publish_agent_event(AgentEvent::Verified {
                    agent_name: agent_name.to_string(),
                    verified_at: now,
                });
            }
            return Ok(CheckOutcome::Continue);
        }

        *failures = failures.saturating_add(1);
        if record.status == AgentStatus::Active && *failures >= self.max_failures {
            record.mark_inactive();
            self.agents.save(&record).await?;
            warn!(
                agent_name,
                consecutive_failures = *failures,
                "Agent marked inactive after failed health checks"
            );
            self.event_bus.publish_agent_event(AgentEvent::MarkedInactive {
                agent_name: agent_name.to_string(),
                consecutive_failures: *failures,
                marked_at: Utc::now(),
            });
        }
        Ok(CheckOutcome::Continue)
    }
}

fn same_registration(current: &AgentRecord, snapshot: &AgentRecord) -> bool {
    current.registered_at == snapshot.registered_at && current.endpoint == snapshot.endpoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::RegistrationRequest;
    use crate::domain::agent_client::{AgentCallError, AgentVerifier, CallErrorClass};
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SwitchVerifier {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl AgentVerifier for SwitchVerifier {
        async fn verify(&self, agent: &AgentRecord) -> Result<(), AgentCallError> {
            self.ping(agent).await
        }

        async fn ping(&self, _agent: &AgentRecord) -> Result<(), AgentCallError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(AgentCallError::new(CallErrorClass::ConnectionRefused, "down"))
            }
        }
    }

    async fn setup() -> (Arc<HealthMonitor>, Arc<InMemoryAgentRepository>, Arc<SwitchVerifier>) {
        let repo = Arc::new(InMemoryAgentRepository::new());
        let verifier = Arc::new(SwitchVerifier {
            healthy: AtomicBool::new(true),
        });
        let workflow = Arc::new(VerificationWorkflow::new(verifier.clone(), Duration::from_millis(100)));
        let config = HealthConfig {
            enabled: true,
            interval_secs: 1,
            max_failures: 2,
        };
        let mut monitor = HealthMonitor::new(
            repo.clone(),
            workflow,
            Arc::new(KeyedLocks::new()),
            EventBus::new(16),
            &config,
        );
        monitor.interval = Duration::from_millis(20);

        let reg = RegistrationRequest::from_json(json!({
            "agent_name": "echo",
            "agent_type": "custom",
            "capabilities": ["text"],
            "acp_base_url": "http://localhost:9001",
            "auth_token": "t",
        }))
        .unwrap()
        .validate()
        .unwrap();
        let mut record = AgentRecord::pending(reg);
        record.mark_verified(Utc::now());
        repo.save(&record).await.unwrap();

        (Arc::new(monitor), repo, verifier)
    }

    async fn wait_for_status(repo: &InMemoryAgentRepository, status: AgentStatus) {
        for _ in 0..100 {
            if let Some(r) = repo.find_by_name("echo").await.unwrap() {
                if r.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("agent never reached {:?}", status);
    }

    #[tokio::test]
    async fn failures_mark_inactive_and_recovery_restores() {
        let (monitor, repo, verifier) = setup().await;
        let mut events = monitor.event_bus.subscribe();
        monitor.watch("echo");

        verifier.healthy.store(false, Ordering::SeqCst);
        wait_for_status(&repo, AgentStatus::Inactive).await;

        verifier.healthy.store(true, Ordering::SeqCst);
        wait_for_status(&repo, AgentStatus::Active).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.iter().any(|e| matches!(
            e,
            crate::infrastructure::event_bus::DomainEvent::Agent(AgentEvent::MarkedInactive { .. })
        )));
        monitor.shutdown();
    }

    #[tokio::test]
    async fn loop_stops_when_record_is_removed() {
        let (monitor, repo, _verifier) = setup().await;
        monitor.watch("echo");
        assert!(monitor.is_watching("echo"));

        repo.delete("echo").await.unwrap();
        for _ in 0..100 {
            if !monitor.is_watching("echo") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("monitor kept watching a removed agent");
    }

    #[tokio::test]
    async fn successful_pings_refresh_last_verified() {
        let (monitor, repo, _verifier) = setup().await;
        let before = repo.find_by_name("echo").await.unwrap().unwrap().last_verified_at;
        monitor.watch("echo");

        tokio::time::sleep(Duration::from_millis(80)).await;
        let after = repo.find_by_name("echo").await.unwrap().unwrap().last_verified_at;
        assert!(after > before);
        monitor.unwatch("echo");
        assert!(!monitor.is_watching("echo"));
    }
}
