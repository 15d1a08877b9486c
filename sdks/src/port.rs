// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Local port allocation.
//!
//! The scan returns the bound listener rather than a bare port number, so
//! the port stays reserved until the protocol server takes it over. Two
//! workers starting concurrently can never be handed the same port.

use std::ops::RangeInclusive;
use tokio::net::TcpListener;
use tracing::debug;

use mesh_gateway_core::error::{ErrorKind, MeshError, MeshResult};
use serde_json::json;

pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 8100..=9100;

pub async fn allocate_port(host: &str, range: RangeInclusive<u16>) -> MeshResult<TcpListener> {
    for port in range.clone() {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                debug!(host, port, "Allocated worker port");
                return Ok(listener);
            }
            Err(e) => debug!(host, port, error = %e, "Port unavailable"),
        }
    }
    Err(MeshError::new(
        ErrorKind::NoFreePort,
        format!(
            "No free port on {} in range {}..={}",
            host,
            range.start(),
            range.end()
        ),
    )
    .with_details(json!({
        "host": host,
        "range_start": range.start(),
        "range_end": range.end(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_allocations_never_collide() {
        let range = 40100..=40160;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let range = range.clone();
                tokio::spawn(async move { allocate_port("127.0.0.1", range).await })
            })
            .collect();

        let mut listeners = Vec::new();
        for handle in handles {
            listeners.push(handle.await.unwrap().unwrap());
        }
        let mut ports: Vec<u16> = listeners
            .iter()
            .map(|l| l.local_addr().unwrap().port())
            .collect();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 8);
    }

    #[tokio::test]
    async fn exhausted_range_is_no_free_port() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = held.local_addr().unwrap().port();

        let err = allocate_port("127.0.0.1", port..=port).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoFreePort);
    }
}
