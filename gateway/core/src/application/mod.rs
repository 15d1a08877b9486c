// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod gateway;
pub mod health;
pub mod key_lock;
pub mod registry;
pub mod repository_factory;
pub mod router;
pub mod session;
pub mod verification;

pub use gateway::MeshGateway;
pub use registry::{AgentRegistryService, StandardAgentRegistry};
pub use router::{CreateRunRequest, RunService, StandardRunRouter};
pub use session::{SessionManager, SessionSweeper};
