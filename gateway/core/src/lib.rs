// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # mesh-gateway-core
//!
//! Agent registry, verification, run routing and session tracking for the
//! Agent Mesh gateway.
//!
//! - **Layer:** Core System
//! - [`domain`]: records, state machines, error taxonomy, repository traits
//! - [`application`]: registry, router, session and health services
//! - [`infrastructure`]: in-memory store, HTTP agent client, event bus
//! - [`presentation`]: axum routes

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
