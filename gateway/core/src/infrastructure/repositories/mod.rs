// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the registry store contracts defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! - **InMemoryAgentRepository** - agent records keyed by name
//! - **InMemoryRunRepository** - run records keyed by run id
//! - **InMemorySessionRepository** - session records keyed by session id
//!
//! Each write replaces one record under a short `parking_lot` write guard, so
//! readers always see a whole record. Guards are never held across `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::agent::AgentRecord;
use crate::domain::repository::{AgentRepository, RepositoryError, RunRepository, SessionRepository};
use crate::domain::run::{RunId, RunRecord};
use crate::domain::session::{SessionId, SessionRecord};

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<String, AgentRecord>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &AgentRecord) -> Result<(), RepositoryError> {
        self.agents
            .write()
            .insert(agent.name.to_string(), agent.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<AgentRecord>, RepositoryError> {
        Ok(self.agents.read().get(name).cloned())
    }

    async fn list_all(&self) -> Result<Vec<AgentRecord>, RepositoryError> {
        let mut agents: Vec<AgentRecord> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(agents)
    }

    async fn delete(&self, name: &str) -> Result<bool, RepositoryError> {
        Ok(self.agents.write().remove(name).is_some())
    }

    async fn delete_all(&self) -> Result<Vec<String>, RepositoryError> {
        let drained: Vec<String> = self.agents.write().drain().map(|(name, _)| name).collect();
        Ok(drained)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRunRepository {
    runs: Arc<RwLock<HashMap<RunId, RunRecord>>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn save(&self, run: &RunRecord) -> Result<(), RepositoryError> {
        self.runs.write().insert(run.id, run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError> {
        Ok(self.runs.read().get(&id).cloned())
    }

    async fn find_recent(
        &self,
        agent_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RepositoryError> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .read()
            .values()
            .filter(|r| agent_name.map_or(true, |name| r.agent_name == name))
            .cloned()
            .collect();
        // Sort by created_at desc
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, session: &SessionRecord) -> Result<(), RepositoryError> {
        self.sessions.write().insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self.sessions.read().get(&id).cloned())
    }

    async fn delete(&self, id: SessionId) -> Result<bool, RepositoryError> {
        Ok(self.sessions.write().remove(&id).is_some())
    }

    async fn find_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, RepositoryError> {
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|s| s.last_activity_at < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::RegistrationRequest;
    use crate::domain::protocol::Message;
    use serde_json::json;

    fn record(name: &str) -> AgentRecord {
        let reg = RegistrationRequest::from_json(json!({
            "agent_name": name,
            "agent_type": "custom",
            "capabilities": ["text"],
            "acp_base_url": "http://localhost:9001",
            "auth_token": "t",
        }))
        .unwrap()
        .validate()
        .unwrap();
        AgentRecord::pending(reg)
    }

    #[tokio::test]
    async fn agents_list_in_registration_order() {
        let repo = InMemoryAgentRepository::new();
        let first = record("first");
        let mut second = record("second");
        second.registered_at = first.registered_at + chrono::Duration::seconds(1);

        repo.save(&second).await.unwrap();
        repo.save(&first).await.unwrap();

        let names: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name.to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);

        assert!(repo.delete("first").await.unwrap());
        assert!(!repo.delete("first").await.unwrap());
        assert_eq!(repo.delete_all().await.unwrap(), vec!["second".to_string()]);
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn runs_are_newest_first_and_filtered() {
        let repo = InMemoryRunRepository::new();
        let mut older = RunRecord::new("alpha", vec![Message::text("1")], None);
        older.created_at = older.created_at - chrono::Duration::seconds(5);
        let newer = RunRecord::new("alpha", vec![Message::text("2")], None);
        let other = RunRecord::new("beta", vec![Message::text("3")], None);
        for r in [&older, &newer, &other] {
            repo.save(r).await.unwrap();
        }

        let alpha = repo.find_recent(Some("alpha"), 10).await.unwrap();
        assert_eq!(alpha.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(repo.find_recent(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sessions_inactive_since_cutoff() {
        let repo = InMemorySessionRepository::new();
        let mut stale = SessionRecord::new("alpha");
        stale.last_activity_at = stale.last_activity_at - chrono::Duration::hours(2);
        let fresh = SessionRecord::new("alpha");
        repo.save(&stale).await.unwrap();
        repo.save(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let inactive = repo.find_inactive_since(cutoff).await.unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, stale.id);
    }
}
