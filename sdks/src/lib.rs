// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Mesh Worker SDK
//!
//! Turn a message handler into a network-reachable agent registered with an
//! Agent Mesh gateway.
//!
//! ```rust,no_run
//! use mesh_agent_sdk::{process_fn, start, RunInput, WorkerConfig};
//!
//! # async fn demo() -> mesh_gateway_core::error::MeshResult<()> {
//! let config = WorkerConfig::new("echo", "custom", vec!["text".into()], None);
//! let handler = process_fn(|input: RunInput| Ok(format!("Processed: {}", input.text())));
//! start(config, handler).await
//! # }
//! ```

pub mod client;
pub mod credential;
pub mod handler;
pub mod port;
pub mod server;
pub mod worker;

pub use client::PlatformClient;
pub use handler::{process_fn, Callbacks, ProcessFn, RunInput, RunOutput, ShutdownReason};
pub use worker::{start, ReadinessPolicy, ShutdownHandle, WorkerConfig, WorkerProcess};
