// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`mesh-gateway-core`)
//!
//! HTTP surface that translates requests into application service calls.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP/SSE (Axum) | Registration, routing and session endpoints plus run event streaming |

pub mod api;
