// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Gateway composition root: wires the registry store, services and
//! background tasks from one [`GatewayConfig`].

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::health::HealthMonitor;
use crate::application::key_lock::KeyedLocks;
use crate::application::registry::{AgentRegistryService, StandardAgentRegistry};
use crate::application::repository_factory::RegistryStore;
use crate::application::router::{RouterTimeouts, RunService, StandardRunRouter};
use crate::application::session::{SessionManager, SessionSweeper};
use crate::application::verification::VerificationWorkflow;
use crate::domain::agent_client::{AgentInvoker, AgentVerifier};
use crate::domain::config::GatewayConfig;
use crate::infrastructure::event_bus::EventBus;

pub struct MeshGateway {
    pub config: GatewayConfig,
    pub store: RegistryStore,
    pub registry: Arc<dyn AgentRegistryService>,
    pub runs: Arc<dyn RunService>,
    pub sessions: Arc<SessionManager>,
    pub event_bus: EventBus,
    health: Option<Arc<HealthMonitor>>,
    sweeper: Arc<SessionSweeper>,
    started_at: Instant,
}

impl MeshGateway {
    pub fn new(
        config: GatewayConfig,
        store: RegistryStore,
        verifier: Arc<dyn AgentVerifier>,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Self {
        let event_bus = EventBus::with_default_capacity();
        let agent_locks = Arc::new(KeyedLocks::new());
        let verification = Arc::new(VerificationWorkflow::new(verifier, config.timeouts.verification()));

        let health = config.health.enabled.then(|| {
            Arc::new(HealthMonitor::new(
                store.agents.clone(),
                verification.clone(),
                agent_locks.clone(),
                event_bus.clone(),
                &config.health,
            ))
        });

        let mut registry = StandardAgentRegistry::new(
            store.agents.clone(),
            verification,
            agent_locks,
            event_bus.clone(),
        );
        if let Some(health) = &health {
            registry = registry.with_health_monitor(health.clone());
        }

        let sessions = Arc::new(SessionManager::new(
            store.sessions.clone(),
            store.agents.clone(),
            config.sessions.inactivity(),
        ));

        let runs = StandardRunRouter::new(
            store.agents.clone(),
            store.runs.clone(),
            sessions.clone(),
            invoker,
            event_bus.clone(),
            RouterTimeouts {
                run: config.timeouts.run(),
                cancel_signal: config.timeouts.cancel_signal(),
            },
        );

        let sweeper = Arc::new(SessionSweeper::new(sessions.clone(), config.sessions.sweep_interval()));

        Self {
            config,
            store,
            registry: Arc::new(registry),
            runs: Arc::new(runs),
            sessions,
            event_bus,
            health,
            sweeper,
            started_at: Instant::now(),
        }
    }

    /// Start the session sweeper. Health loops start per agent on registration.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.sweeper.clone().start()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn shutdown(&self) {
        info!("Stopping gateway background tasks");
        self.sweeper.shutdown_token().cancel();
        if let Some(health) = &self.health {
            health.shutdown();
        }
    }
}
