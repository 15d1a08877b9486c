// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_client;
pub mod event_bus;
pub mod repositories;

pub use agent_client::HttpAgentClient;
pub use event_bus::{DomainEvent, EventBus};
