// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Mesh CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** gateway daemon, gateway HTTP client and command handlers

pub mod commands;
pub mod daemon;
