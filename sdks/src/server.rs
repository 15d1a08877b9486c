// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Worker protocol server
//!
//! | Route | Auth | Purpose |
//! |-------|------|---------|
//! | `GET /agents` | - | manifest listing used by gateway verification |
//! | `GET /ping` | - | liveness, status from `on_health_check` |
//! | `POST /runs` | Bearer | invoke the process function |
//! | `POST /runs/{id}/cancel` | Bearer | best-effort cancel acknowledgement |

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mesh_gateway_core::error::{ErrorKind, MeshError};
use mesh_gateway_core::protocol::{AgentList, AgentManifest, AgentRunRequest, AgentRunResponse, PingResponse};

use crate::handler::{Callbacks, ProcessFn, RunInput};

#[derive(Clone)]
pub struct WorkerServerState {
    inner: Arc<Inner>,
}

struct Inner {
    manifest: AgentManifest,
    credential: String,
    handler: ProcessFn,
    callbacks: Callbacks,
}

impl WorkerServerState {
    pub fn new(manifest: AgentManifest, credential: String, handler: ProcessFn, callbacks: Callbacks) -> Self {
        Self {
            inner: Arc::new(Inner {
                manifest,
                credential,
                handler,
                callbacks,
            }),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == self.inner.credential)
    }
}

pub fn router(state: WorkerServerState) -> Router {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/ping", get(ping))
        .route("/runs", post(run))
        .route("/runs/{id}/cancel", post(cancel))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled; in-flight requests are drained.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn unauthorized() -> Response {
    let error = MeshError::new(
        ErrorKind::PlatformAuthenticationError,
        "Missing or invalid bearer credential",
    );
    (StatusCode::UNAUTHORIZED, Json(error.to_body())).into_response()
}

async fn list_agents(State(state): State<WorkerServerState>) -> Json<AgentList> {
    Json(AgentList {
        agents: vec![state.inner.manifest.clone()],
    })
}

/// Anything other than `ok` answers 503 so the gateway counts it as a failed ping.
async fn ping(State(state): State<WorkerServerState>) -> Response {
    let status = state.inner.callbacks.health_status();
    debug!(status = %status, "Health check");
    let code = if status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(PingResponse { status })).into_response()
}

async fn run(
    State(state): State<WorkerServerState>,
    headers: HeaderMap,
    Json(request): Json<AgentRunRequest>,
) -> Response {
    if !state.authorized(&headers) {
        warn!(run_id = %request.run_id, "Rejected run with invalid credential");
        return unauthorized();
    }

    let run_id = request.run_id.clone();
    info!(run_id = %run_id, agent_name = %state.inner.manifest.name, "Run received");

    let task_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let input = RunInput::from(request);
        task_state.inner.callbacks.message(&input)?;
        (task_state.inner.handler)(input)
    })
    .await;

    let cause = match outcome {
        Ok(Ok(output)) => {
            return Json(AgentRunResponse {
                run_id,
                status: AgentRunResponse::COMPLETED.to_string(),
                output: output.messages,
                session_context: output.session_context,
            })
            .into_response();
        }
        Ok(Err(e)) => format!("{:#}", e),
        Err(e) => format!("handler panicked: {}", e),
    };

    let error = MeshError::new(
        ErrorKind::WorkerHandlerFailed,
        format!("Handler failed for run {}: {}", run_id, cause),
    )
    .with_details(json!({
        "run_id": run_id,
        "agent_name": state.inner.manifest.name,
        "cause": cause,
    }));
    warn!(run_id = %run_id, error = %error, "Run handler failed");
    state.inner.callbacks.error(&error);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error.to_body())).into_response()
}

async fn cancel(
    State(state): State<WorkerServerState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    // The handler runs to completion; the gateway has already stopped waiting
    info!(run_id = %id, "Cancel requested");
    (
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": id, "status": "cancel_requested" })),
    )
        .into_response()
}
