// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Run Router / Executor
//!
//! Resolves the target agent and session, records the run, delivers it to the
//! agent under a bounded timeout and maps the outcome back onto the run.
//!
//! ```text
//! create_run ──▶ lookup agent ──▶ load/create session ──▶ save Created
//!            ──▶ InProgress ──▶ invoke (timeout | cancel) ──▶ Completed | Failed | Cancelled
//! ```
//!
//! Every state transition is a read-modify-write of the stored record under
//! the run id's lock, so a cancellation racing a completion produces exactly
//! one terminal state: whichever write lands first, the other is refused.
//! Nothing here retries.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::key_lock::KeyedLocks;
use crate::application::session::SessionManager;
use crate::domain::agent::{AgentRecord, AgentStatus};
use crate::domain::agent_client::{AgentCallError, AgentInvoker, CallErrorClass};
use crate::domain::error::{ErrorKind, MeshError, MeshResult};
use crate::domain::events::RunEvent;
use crate::domain::protocol::{AgentRunRequest, AgentRunResponse, Message};
use crate::domain::repository::{AgentRepository, RunRepository};
use crate::domain::run::{RunId, RunRecord, RunState, RunTransitionError};
use crate::domain::session::SessionId;
use crate::infrastructure::event_bus::EventBus;

/// Validated input to [`RunService::create_run`].
#[derive(Debug, Clone)]
pub struct CreateRunRequest {
    pub agent_name: String,
    pub input: Vec<Message>,
    pub session_id: Option<String>,
    /// Start a new session when `session_id` is absent
    pub stateful: bool,
}

impl CreateRunRequest {
    pub fn new(agent_name: impl Into<String>, input: Vec<Message>) -> Self {
        Self {
            agent_name: agent_name.into(),
            input,
            session_id: None,
            stateful: false,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self
    }
}

#[async_trait]
pub trait RunService: Send + Sync {
    /// Errors before the run record exists are returned as `Err`. Once the
    /// record exists the call returns it in a terminal state, with any
    /// delivery failure recorded in `error`.
    ///
    /// A run the agent completed stays `Completed` even if its session could
    /// not be updated afterwards (e.g. the session expired mid-run); that
    /// failure is attached to the run's `error` and the output is kept.
    async fn create_run(&self, request: CreateRunRequest) -> MeshResult<RunRecord>;

    async fn get_run(&self, id: RunId) -> MeshResult<RunRecord>;

    /// Valid only from `Created` / `InProgress`; otherwise `InvalidState`.
    async fn cancel_run(&self, id: RunId) -> MeshResult<RunRecord>;

    async fn list_runs(&self, agent_name: Option<&str>, limit: usize) -> MeshResult<Vec<RunRecord>>;
}

#[derive(Debug, Clone, Copy)]
pub struct RouterTimeouts {
    pub run: Duration,
    pub cancel_signal: Duration,
}

impl Default for RouterTimeouts {
    fn default() -> Self {
        Self {
            run: Duration::from_secs(30),
            cancel_signal: Duration::from_secs(2),
        }
    }
}

enum Delivery {
    Responded(AgentRunResponse),
    CallFailed(AgentCallError),
    TimedOut,
    Cancelled,
}

/// Cheap to clone; clones share stores, locks and the in-flight table.
#[derive(Clone)]
pub struct StandardRunRouter {
    agents: Arc<dyn AgentRepository>,
    runs: Arc<dyn RunRepository>,
    sessions: Arc<SessionManager>,
    invoker: Arc<dyn AgentInvoker>,
    event_bus: EventBus,
    locks: Arc<KeyedLocks>,
    in_flight: Arc<DashMap<RunId, CancellationToken>>,
    timeouts: RouterTimeouts,
}

impl StandardRunRouter {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        runs: Arc<dyn RunRepository>,
        sessions: Arc<SessionManager>,
        invoker: Arc<dyn AgentInvoker>,
        event_bus: EventBus,
        timeouts: RouterTimeouts,
    ) -> Self {
        Self {
            agents,
            runs,
            sessions,
            invoker,
            event_bus,
            locks: Arc::new(KeyedLocks::new()),
            in_flight: Arc::new(DashMap::new()),
            timeouts,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Apply one transition to the stored record under the run lock.
    async fn transition<F>(&self, id: RunId, apply: F) -> MeshResult<RunRecord>
    where
        F: FnOnce(&mut RunRecord) -> Result<(), RunTransitionError> + Send,
    {
        let _guard = self.locks.lock(&id.to_string()).await;
        let mut run = self
            .runs
            .find_by_id(id)
            .await?
            .ok_or_else(|| MeshError::run_not_found(&id.to_string()))?;
        let from = run.state();
        apply(&mut run)?;
        self.runs.save(&run).await?;
        self.publish(&run, Some(from));
        Ok(run)
    }

    fn publish(&self, run: &RunRecord, from: Option<RunState>) {
        debug!(run_id = %run.id, from = ?from, to = %run.state(), "Run state changed");
        self.event_bus.publish_run_event(RunEvent::StateChanged {
            run_id: run.id,
            agent_name: run.agent_name.clone(),
            from,
            to: run.state(),
            at: Utc::now(),
        });
    }

    /// Terminal write that tolerates losing a race with `cancel_run`: the
    /// stored record is returned either way.
    async fn finish<F>(&self, id: RunId, apply: F) -> MeshResult<RunRecord>
    where
        F: FnOnce(&mut RunRecord) -> Result<(), RunTransitionError> + Send,
    {
        match self.transition(id, apply).await {
            Ok(run) => Ok(run),
            Err(e) if e.kind == ErrorKind::InvalidState => self.get_run(id).await,
            Err(e) => Err(e),
        }
    }

    async fn resolve_agent(&self, agent_name: &str) -> MeshResult<AgentRecord> {
        let agent = self
            .agents
            .find_by_name(agent_name)
            .await?
            .ok_or_else(|| MeshError::agent_not_found(agent_name))?;
        if agent.status != AgentStatus::Active {
            return Err(MeshError::agent_unavailable(agent_name, agent.status.as_str()));
        }
        Ok(agent)
    }

    async fn deliver(
        &self,
        agent: &AgentRecord,
        request: &AgentRunRequest,
        cancel: &CancellationToken,
    ) -> Delivery {
        tokio::select! {
            _ = cancel.cancelled() => Delivery::Cancelled,
            outcome = tokio::time::timeout(self.timeouts.run, self.invoker.invoke(agent, request)) => {
                match outcome {
                    Ok(Ok(response)) => Delivery::Responded(response),
                    Ok(Err(e)) if e.class == CallErrorClass::Timeout => Delivery::TimedOut,
                    Ok(Err(e)) => Delivery::CallFailed(e),
                    Err(_) => Delivery::TimedOut,
                }
            }
        }
    }

    fn invocation_error(&self, agent: &AgentRecord, e: &AgentCallError) -> MeshError {
        MeshError::new(
            ErrorKind::AgentInvocationFailed,
            format!("Agent '{}' invocation failed: {}", agent.name, e.message),
        )
        .with_details(json!({
            "agent_name": agent.name.as_str(),
            "endpoint": agent.endpoint,
            "error_class": e.class.as_str(),
            "cause": e.message,
        }))
    }

    fn timeout_error(&self, agent: &AgentRecord) -> MeshError {
        MeshError::new(
            ErrorKind::RoutingTimeout,
            format!(
                "Agent '{}' did not respond within {} ms",
                agent.name,
                self.timeouts.run.as_millis()
            ),
        )
        .with_details(json!({
            "agent_name": agent.name.as_str(),
            "endpoint": agent.endpoint,
            "error_class": CallErrorClass::Timeout.as_str(),
            "timeout_ms": self.timeouts.run.as_millis() as u64,
        }))
    }

    async fn signal_cancel(&self, run: &RunRecord) {
        let Ok(Some(agent)) = self.agents.find_by_name(&run.agent_name).await else {
            return;
        };
        let invoker = self.invoker.clone();
        let limit = self.timeouts.cancel_signal;
        let run_id = run.id;
        tokio::spawn(async move {
            match tokio::time::timeout(limit, invoker.cancel(&agent, run_id)).await {
                Ok(Ok(())) => debug!(run_id = %run_id, "Agent acknowledged cancellation"),
                Ok(Err(e)) => debug!(run_id = %run_id, "Cancellation signal not delivered: {}", e),
                Err(_) => debug!(run_id = %run_id, "Cancellation signal timed out"),
            }
        });
    }
}

#[async_trait]
impl RunService for StandardRunRouter {
    async fn create_run(&self, request: CreateRunRequest) -> MeshResult<RunRecord> {
        let agent = self.resolve_agent(&request.agent_name).await?;

        let session = match &request.session_id {
            Some(raw) => {
                let id = SessionId::from_string(raw).map_err(|_| MeshError::session_not_found(raw))?;
                Some(self.sessions.get_or_create(Some(id), &request.agent_name).await?)
            }
            None if request.stateful => Some(self.sessions.create(&request.agent_name).await?),
            None => None,
        };

        let run = RunRecord::new(
            request.agent_name.clone(),
            request.input,
            session.as_ref().map(|s| s.id),
        );
        let run_id = run.id;
        self.runs.save(&run).await?;
        self.publish(&run, None);

        let cancel = CancellationToken::new();
        self.in_flight.insert(run_id, cancel.clone());

        // Delivery runs detached so a dropped caller cannot strand the run
        let router = self.clone();
        let session = session.map(|s| (s.id, s.context));
        let delivery = tokio::spawn(async move {
            let result = router.execute(&agent, run, session, &cancel).await;
            router.in_flight.remove(&run_id);
            router.locks.prune();
            result
        });

        delivery.await.map_err(|e| {
            MeshError::new(
                ErrorKind::AgentInvocationFailed,
                format!("Delivery task for run {} ended abnormally: {}", run_id, e),
            )
            .with_details(json!({ "run_id": run_id.to_string(), "cause": e.to_string() }))
        })?
    }

    async fn get_run(&self, id: RunId) -> MeshResult<RunRecord> {
        self.runs
            .find_by_id(id)
            .await?
            .ok_or_else(|| MeshError::run_not_found(&id.to_string()))
    }

    async fn cancel_run(&self, id: RunId) -> MeshResult<RunRecord> {
        let run = self.transition(id, RunRecord::cancel).await?;
        if let Some((_, token)) = self.in_flight.remove(&id) {
            token.cancel();
        }
        info!(run_id = %id, agent_name = %run.agent_name, "Run cancelled");
        if run.started_at.is_some() {
            self.signal_cancel(&run).await;
        }
        Ok(run)
    }

    async fn list_runs(&self, agent_name: Option<&str>, limit: usize) -> MeshResult<Vec<RunRecord>> {
        Ok(self.runs.find_recent(agent_name, limit).await?)
    }
}

impl StandardRunRouter {
    async fn execute(
        &self,
        agent: &AgentRecord,
        run: RunRecord,
        session: Option<(SessionId, serde_json::Value)>,
        cancel: &CancellationToken,
    ) -> MeshResult<RunRecord> {
        let run_id = run.id;
        let run = match self.transition(run_id, RunRecord::start).await {
            Ok(run) => run,
            // Cancelled between creation and start
            Err(e) if e.kind == ErrorKind::InvalidState => return self.get_run(run_id).await,
            Err(e) => return Err(e),
        };

        let request = AgentRunRequest {
            run_id: run_id.to_string(),
            agent_name: run.agent_name.clone(),
            input: run.input.clone(),
            session_id: session.as_ref().map(|(id, _)| id.to_string()),
            session_context: session.as_ref().map(|(_, ctx)| ctx.clone()),
        };

        info!(run_id = %run_id, agent_name = %agent.name, endpoint = %agent.endpoint, "Delivering run");

        match self.deliver(agent, &request, cancel).await {
            Delivery::Responded(response) if response.is_completed() => {
                let mut session_error = None;
                if let Some((session_id, _)) = &session {
                    let touched = match response.session_context {
                        Some(update) => self.sessions.merge_context(*session_id, update).await,
                        None => self.sessions.touch(*session_id).await,
                    };
                    if let Err(e) = touched {
                        warn!(run_id = %run_id, session_id = %session_id, "Session update failed: {}", e);
                        session_error = Some(e);
                    }
                }
                let output = response.output;
                let run = self
                    .finish(run_id, move |r| match session_error {
                        Some(e) => r.complete_with_error(output, e),
                        None => r.complete(output),
                    })
                    .await?;
                info!(run_id = %run_id, state = %run.state(), "Run finished");
                Ok(run)
            }
            Delivery::Responded(response) => {
                let error = MeshError::new(
                    ErrorKind::AgentInvocationFailed,
                    format!("Agent '{}' reported run status '{}'", agent.name, response.status),
                )
                .with_details(json!({
                    "agent_name": agent.name.as_str(),
                    "endpoint": agent.endpoint,
                    "error_class": "agent_status",
                    "status": response.status,
                }));
                warn!(run_id = %run_id, "{}", error);
                self.finish(run_id, move |r| r.fail(error)).await
            }
            Delivery::CallFailed(e) => {
                let error = self.invocation_error(agent, &e);
                warn!(run_id = %run_id, error_class = %e.class, "{}", error);
                self.finish(run_id, move |r| r.fail(error)).await
            }
            Delivery::TimedOut => {
                let error = self.timeout_error(agent);
                warn!(run_id = %run_id, "{}", error);
                self.finish(run_id, move |r| r.fail(error)).await
            }
            Delivery::Cancelled => self.get_run(run_id).await,
        }
    }
}
