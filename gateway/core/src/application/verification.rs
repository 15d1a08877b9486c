// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Verification Workflow
//!
//! One bounded, non-retried liveness check against a newly registered agent.
//! This is the only code path that moves an `AgentRecord` to `Active`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::agent::AgentRecord;
use crate::domain::agent_client::{AgentCallError, AgentVerifier, CallErrorClass};
use crate::domain::error::{MeshError, MeshResult};

pub struct VerificationWorkflow {
    verifier: Arc<dyn AgentVerifier>,
    timeout: Duration,
}

impl VerificationWorkflow {
    pub fn new(verifier: Arc<dyn AgentVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// On success the record is `Active` with `last_verified_at = now`; on
    /// failure it is left untouched and the error names the endpoint and
    /// failure class.
    pub async fn verify(&self, record: &mut AgentRecord) -> MeshResult<()> {
        let outcome = match tokio::time::timeout(self.timeout, self.verifier.verify(record)).await {
            Ok(result) => result,
            Err(_) => Err(AgentCallError::new(
                CallErrorClass::Timeout,
                format!("no response within {} ms", self.timeout.as_millis()),
            )),
        };

        match outcome {
            Ok(()) => {
                record.mark_verified(Utc::now());
                info!(agent_name = %record.name, endpoint = %record.endpoint, "Agent verified");
                Ok(())
            }
            Err(e) => {
                warn!(
                    agent_name = %record.name,
                    endpoint = %record.endpoint,
                    error_class = %e.class,
                    "Agent verification failed: {}",
                    e.message
                );
                Err(MeshError::verification_failed(
                    record.name.as_str(),
                    &record.endpoint,
                    e.class.as_str(),
                    e.message,
                ))
            }
        }
    }

    /// Periodic ping under the same timeout; never changes the record.
    pub async fn ping(&self, record: &AgentRecord) -> Result<(), AgentCallError> {
        match tokio::time::timeout(self.timeout, self.verifier.ping(record)).await {
            Ok(result) => result,
            Err(_) => Err(AgentCallError::new(
                CallErrorClass::Timeout,
                format!("no ping response within {} ms", self.timeout.as_millis()),
            )),
        }
    }
}
