// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod agent_client;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod repository;
pub mod run;
pub mod session;
