// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the mesh CLI

pub mod agent;
pub mod config;
pub mod echo;
pub mod run;
pub mod status;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::echo::EchoAgentArgs;
pub use self::run::RunCommand;
